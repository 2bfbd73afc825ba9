use chrono::Utc;
use uuid::Uuid;

use ecotrack_types::models::{
    Address, Category, Difficulty, FieldKind, Impact, Mission, SchemaField,
};

use crate::models::NewUser;

pub(crate) fn new_user(email: &str) -> NewUser {
    NewUser {
        id: Uuid::new_v4(),
        name: "Robin".into(),
        email: email.into(),
        password_hash: "hash".into(),
        address: Address::default(),
        is_admin: false,
    }
}

pub(crate) fn new_mission(is_published: bool) -> Mission {
    let now = Utc::now();
    Mission {
        id: Uuid::new_v4(),
        title: "Line-dry your laundry".into(),
        description: "Skip the dryer for a week.".into(),
        category: Category::Energy,
        difficulty: Difficulty::Easy,
        points: 40,
        impact: Impact {
            co2_kg: 2.5,
            water_liters: 0.0,
            waste_kg: 0.0,
        },
        submission_schema: vec![SchemaField {
            key: "loads".into(),
            label: "Loads dried outside".into(),
            kind: FieldKind::Number,
            required: true,
            options: vec![],
        }],
        is_published,
        created_by: None,
        created_at: now,
        updated_at: now,
    }
}
