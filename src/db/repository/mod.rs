pub mod appointment;
pub mod business;
pub mod daily_agenda;
pub mod general_agenda;
pub mod reminder_queue;
pub mod user;

pub use appointment::AppointmentRepository;
pub use business::BusinessRepository;
pub use daily_agenda::DailyAgendaRepository;
pub use general_agenda::GeneralAgendaRepository;
pub use reminder_queue::ReminderQueueRepository;
pub use user::UserRepository;

#[cfg(test)]
pub(crate) mod testing {
    use chrono::Utc;
    use sqlx::SqlitePool;
    use uuid::Uuid;

    use super::{BusinessRepository, UserRepository};
    use crate::db::models::{Business, PhoneNumber, Role, User};
    use crate::db::{BusinessStore, UserStore};

    /// Inserts an enabled user. The password hash is not a real bcrypt hash.
    pub async fn seed_user(pool: &SqlitePool, email: &str, phone: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: email.split('@').next().unwrap_or(email).to_string(),
            email: email.to_string(),
            roles: vec![Role::User],
            password_hash: "not-a-hash".to_string(),
            enabled: true,
            phone_no: PhoneNumber::parse(phone).unwrap(),
            date_created: now,
            date_updated: now,
        };
        UserRepository::new(pool.clone()).create(&user).await.unwrap();
        user
    }

    pub async fn seed_business(pool: &SqlitePool, owner_id: Uuid) -> Business {
        let now = Utc::now();
        let business = Business {
            id: Uuid::new_v4(),
            owner_id,
            name: format!("Business {}", &owner_id.to_string()[..8]),
            description: String::new(),
            date_created: now,
            date_updated: now,
        };
        BusinessRepository::new(pool.clone())
            .create(&business)
            .await
            .unwrap();
        business
    }
}
