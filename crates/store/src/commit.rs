//! The shared commit discipline.
//!
//! Every successful mutation, on either store variant, flows through
//! [`commit`]: copy the snapshot, bump the version, stamp `updatedAt`,
//! append the incoming event, and (for actions) run the reducer on the
//! post-copy state and append whatever it emits. Reducer no-ops still
//! commit; the version advances and the action stays on the log.

use chrono::Utc;
use serde_json::Value;

use dt_engine::{reduce, ChatEntry, EncounterState, LogEvent, Role};

/// The mutation kinds a store can commit.
pub(crate) enum Mutation<'a> {
    Action { role: Role, action: &'a Value },
    Roll { role: Role, roll: &'a Value },
    Chat { role: Role, message: &'a str },
}

/// Produce the committed successor of `state` for one mutation.
pub(crate) fn commit(state: &EncounterState, mutation: Mutation<'_>) -> EncounterState {
    let mut next = state.clone();
    next.version += 1;
    next.meta.updated_at = Utc::now();

    match mutation {
        Mutation::Action { role, action } => {
            next.log.push(LogEvent::Action {
                role,
                action: action.clone(),
            });
            // The reducer sees the already-bumped state so its events land
            // after the action event.
            let reduced = reduce(&next, action);
            let mut next = reduced.state;
            next.log.extend(reduced.events);
            next
        }
        Mutation::Roll { role, roll } => {
            next.log.push(LogEvent::Roll {
                role,
                roll: roll.clone(),
                who_label: string_field(roll, "whoLabel"),
                actor_id: string_field(roll, "actorId"),
            });
            next
        }
        Mutation::Chat { role, message } => {
            next.log.push(LogEvent::Chat {
                role,
                message: message.to_owned(),
                who_label: role.who_label().to_owned(),
                actor_id: None,
            });
            next.chat.push(ChatEntry {
                role,
                text: message.to_owned(),
                who_label: role.who_label().to_owned(),
                actor_id: None,
            });
            next
        }
    }
}

/// Pull an attribution field out of an opaque roll record.
pub(crate) fn string_field(record: &Value, key: &str) -> Option<String> {
    record.get(key).and_then(Value::as_str).map(str::to_owned)
}
