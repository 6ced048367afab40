//! Action parsing at the reducer boundary.
//!
//! Actions arrive as untyped JSON so clients can attach extra fields freely.
//! `type` is normalized to uppercase before dispatch. A known type whose
//! parameters do not match the expected shape parses to `Invalid`, which the
//! reducer turns into a do-nothing reduction.

use serde_json::Value;

use crate::state::Effect;

#[derive(Debug, Clone)]
pub(crate) enum HostAction {
    NextTurn,
    AddEffect { effect: Effect },
    RemoveEffect { effect_id: String },
    ApplyDamage { actor_id: String, damage_taken: i64 },
    ResolveConcentrationSave { actor_id: String, success: bool },
    ApplySaveResult { effect_id: String, success: bool },
}

#[derive(Debug, Clone)]
pub(crate) enum ParsedAction {
    Known(HostAction),
    /// Recognized as an action document but not a type we interpret.
    Unknown,
    /// Known type, malformed parameters.
    Invalid,
}

pub(crate) fn parse_action(action: &Value) -> ParsedAction {
    let action_type = action
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_uppercase();

    match action_type.as_str() {
        "NEXT_TURN" => ParsedAction::Known(HostAction::NextTurn),
        "ADD_EFFECT" => parse_add_effect(action),
        "REMOVE_EFFECT" => match non_empty_string(action, "effectId") {
            Some(effect_id) => ParsedAction::Known(HostAction::RemoveEffect { effect_id }),
            None => ParsedAction::Invalid,
        },
        "APPLY_DAMAGE" => parse_apply_damage(action),
        "RESOLVE_CONCENTRATION_SAVE" => {
            match (non_empty_string(action, "actorId"), bool_field(action, "success")) {
                (Some(actor_id), Some(success)) => {
                    ParsedAction::Known(HostAction::ResolveConcentrationSave { actor_id, success })
                }
                _ => ParsedAction::Invalid,
            }
        }
        "APPLY_SAVE_RESULT" => {
            match (non_empty_string(action, "effectId"), bool_field(action, "success")) {
                (Some(effect_id), Some(success)) => {
                    ParsedAction::Known(HostAction::ApplySaveResult { effect_id, success })
                }
                _ => ParsedAction::Invalid,
            }
        }
        _ => ParsedAction::Unknown,
    }
}

fn parse_add_effect(action: &Value) -> ParsedAction {
    let Some(raw) = action.get("effect") else {
        return ParsedAction::Invalid;
    };
    match serde_json::from_value::<Effect>(raw.clone()) {
        Ok(effect) => ParsedAction::Known(HostAction::AddEffect { effect }),
        Err(_) => ParsedAction::Invalid,
    }
}

fn parse_apply_damage(action: &Value) -> ParsedAction {
    let actor_id = non_empty_string(action, "actorId");
    // `as_i64` rejects floats, so a fractional damage value is invalid.
    let damage_taken = action
        .get("damageTaken")
        .and_then(Value::as_i64)
        .filter(|damage| *damage >= 1);
    match (actor_id, damage_taken) {
        (Some(actor_id), Some(damage_taken)) => {
            ParsedAction::Known(HostAction::ApplyDamage {
                actor_id,
                damage_taken,
            })
        }
        _ => ParsedAction::Invalid,
    }
}

fn non_empty_string(action: &Value, key: &str) -> Option<String> {
    action
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

fn bool_field(action: &Value, key: &str) -> Option<bool> {
    action.get(key).and_then(Value::as_bool)
}
