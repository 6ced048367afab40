//! The pure reducer over the closed action vocabulary.
//!
//! `reduce` never fails and never performs I/O. Unknown action types only
//! promote `setup → running`; known types with malformed parameters return
//! the state untouched. Versioning and log appends for the incoming action
//! itself are the store's job; the reducer only emits the engine events
//! that follow from it.

use serde_json::Value;

use crate::action::{parse_action, HostAction, ParsedAction};
use crate::event::{LogEvent, TimingPhase};
use crate::state::{Effect, EncounterState, EncounterStatus};

/// Result of one reduction: the next state plus the engine events to append
/// to the log, in emission order.
#[derive(Debug, Clone)]
pub struct Reduced {
    pub state: EncounterState,
    pub events: Vec<LogEvent>,
}

impl Reduced {
    fn unchanged(state: EncounterState) -> Self {
        Reduced {
            state,
            events: Vec::new(),
        }
    }
}

/// Apply one host action to a state snapshot.
pub fn reduce(state: &EncounterState, action: &Value) -> Reduced {
    match parse_action(action) {
        ParsedAction::Invalid => Reduced::unchanged(state.clone()),
        ParsedAction::Unknown => Reduced::unchanged(with_running_status(state.clone())),
        ParsedAction::Known(host_action) => {
            let next = with_running_status(state.clone());
            apply(next, host_action)
        }
    }
}

/// First-mutation promotion: any interpreted action moves a fresh encounter
/// out of `setup`. The transition never runs backwards.
fn with_running_status(mut state: EncounterState) -> EncounterState {
    if state.status == EncounterStatus::Setup {
        state.status = EncounterStatus::Running;
    }
    state
}

fn apply(state: EncounterState, action: HostAction) -> Reduced {
    match action {
        HostAction::NextTurn => apply_next_turn(state),
        HostAction::AddEffect { effect } => apply_add_effect(state, effect),
        HostAction::RemoveEffect { effect_id } => apply_remove_effect(state, effect_id),
        HostAction::ApplyDamage {
            actor_id,
            damage_taken,
        } => apply_damage(state, actor_id, damage_taken),
        HostAction::ResolveConcentrationSave { actor_id, success } => {
            resolve_concentration_save(state, actor_id, success)
        }
        HostAction::ApplySaveResult { effect_id, success } => {
            apply_save_result(state, effect_id, success)
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// NEXT_TURN
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn apply_next_turn(mut state: EncounterState) -> Reduced {
    if state.turn_order.is_empty() {
        // No combatants: the turn still "ends", nothing advances.
        return Reduced {
            state,
            events: vec![LogEvent::Timing {
                timing: TimingPhase::TurnEnd,
                actor_id: None,
            }],
        };
    }

    let current = state.turn_order.get(state.turn_index).cloned();
    let mut events = vec![LogEvent::Timing {
        timing: TimingPhase::TurnEnd,
        actor_id: current,
    }];

    let mut new_index = state.turn_index + 1;
    let wrapped = new_index >= state.turn_order.len();
    if wrapped {
        new_index = 0;
    }
    state.turn_index = new_index;

    if wrapped {
        events.push(LogEvent::Timing {
            timing: TimingPhase::RoundEnd,
            actor_id: None,
        });
        state.effects = tick_round_end_effects(std::mem::take(&mut state.effects));
        state.round += 1;
        events.push(LogEvent::Timing {
            timing: TimingPhase::RoundStart,
            actor_id: None,
        });
    }

    events.push(LogEvent::Timing {
        timing: TimingPhase::TurnStart,
        actor_id: state.turn_order.get(new_index).cloned(),
    });

    Reduced { state, events }
}

/// Round-end tick: duration-bounded effects lose one round and expire at
/// zero; unbounded effects pass through. Order is preserved.
fn tick_round_end_effects(effects: Vec<Effect>) -> Vec<Effect> {
    let mut surviving = Vec::with_capacity(effects.len());
    for mut effect in effects {
        if let Some(rounds) = effect.rounds_remaining {
            let rounds = rounds - 1;
            if rounds <= 0 {
                continue;
            }
            effect.rounds_remaining = Some(rounds);
        }
        surviving.push(effect);
    }
    surviving
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Effects
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn apply_add_effect(mut state: EncounterState, effect: Effect) -> Reduced {
    state.effects.push(effect.clone());
    Reduced {
        state,
        events: vec![LogEvent::EffectAdded { effect }],
    }
}

fn apply_remove_effect(mut state: EncounterState, effect_id: String) -> Reduced {
    let Some(index) = state.effects.iter().position(|e| e.id == effect_id) else {
        return Reduced::unchanged(state);
    };
    state.effects.remove(index);
    Reduced {
        state,
        events: vec![LogEvent::EffectRemoved { effect_id }],
    }
}

fn apply_save_result(mut state: EncounterState, effect_id: String, success: bool) -> Reduced {
    if success {
        if let Some(index) = state.effects.iter().position(|e| e.id == effect_id) {
            state.effects.remove(index);
        }
    }
    Reduced {
        state,
        events: vec![LogEvent::SaveApplied { effect_id, success }],
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Concentration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn apply_damage(mut state: EncounterState, actor_id: String, damage_taken: i64) -> Reduced {
    let Some(Some(entry)) = state.concentration.get_mut(&actor_id) else {
        // Not concentrating: damage is bookkeeping for the table, not us.
        return Reduced::unchanged(state);
    };

    let dc = (damage_taken / 2).max(10);
    entry.check_needed = Some(true);
    entry.dc = Some(dc);
    entry.last_damage_taken = Some(damage_taken);

    Reduced {
        state,
        events: vec![LogEvent::ConcentrationCheckNeeded { actor_id, dc }],
    }
}

fn resolve_concentration_save(
    mut state: EncounterState,
    actor_id: String,
    success: bool,
) -> Reduced {
    if success {
        if let Some(Some(entry)) = state.concentration.get_mut(&actor_id) {
            entry.check_needed = Some(false);
            entry.last_result = Some(true);
        }
    } else {
        state.concentration.insert(actor_id.clone(), None);
        state
            .effects
            .retain(|effect| !bound_to_concentration(effect, &actor_id));
    }

    Reduced {
        state,
        events: vec![LogEvent::ConcentrationResolved { actor_id, success }],
    }
}

/// An effect falls with its caster's concentration if it names the caster as
/// its concentration anchor, or if the caster sourced it and it is flagged
/// as requiring concentration.
fn bound_to_concentration(effect: &Effect, actor_id: &str) -> bool {
    effect.concentration_actor_id.as_deref() == Some(actor_id)
        || (effect.source_actor_id.as_deref() == Some(actor_id)
            && effect.requires_concentration == Some(true))
}
