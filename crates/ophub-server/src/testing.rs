use ophub_db::entities::users;
use ophub_domain::{Role, UserStatus};
use sea_orm::{ActiveModelTrait, DatabaseConnection, NotSet, Set};
use sea_orm_migration::MigratorTrait;

use crate::auth::Principal;

pub async fn test_db() -> DatabaseConnection {
    let db = ophub_db::connect_in_memory()
        .await
        .expect("failed to open in-memory database");
    ophub_migration::Migrator::up(&db, None)
        .await
        .expect("failed to run migrations");
    db
}

pub async fn insert_user(
    db: &DatabaseConnection,
    email: &str,
    role: Role,
    status: UserStatus,
) -> users::Model {
    let now = chrono::Utc::now();
    users::ActiveModel {
        id: NotSet,
        email: Set(email.to_string()),
        first_name: Set("Test".to_string()),
        last_name: Set("User".to_string()),
        status: Set(status.as_str().to_string()),
        role: Set(role.as_str().to_string()),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(db)
    .await
    .expect("failed to insert user")
}

pub async fn principal(db: &DatabaseConnection, email: &str, role: Role) -> Principal {
    let user = insert_user(db, email, role, UserStatus::Active).await;
    Principal::from_user(&user).expect("active user is a principal")
}
