use llmroom_core::{Room, Role, Turn};
use llmroom_entities::{rooms, turns};

pub fn room_from_model(m: rooms::Model) -> Room {
    Room {
        room_id: m.room_id,
        backend: m.backend,
        model: m.model,
        system_prompt: m.system_prompt,
        created_at: m.created_at.and_utc(),
        updated_at: m.updated_at.and_utc(),
    }
}

pub fn turn_from_model(m: turns::Model) -> anyhow::Result<Turn> {
    let role = m.role.parse::<Role>()?;
    Ok(Turn {
        room_id: m.room_id,
        sequence: m.sequence,
        role,
        content: m.content,
        created_at: m.created_at.and_utc(),
    })
}
