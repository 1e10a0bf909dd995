use anyhow::{Context, Result};
use log::info;

use crate::domain::{Department, DomainStore, Role, User};
use crate::model::{AuditContext, Entity, EntityRef, GroupFilter};
use crate::store::traits::EntityStore;

/// Helper function to create a Department with a fixed id equal to its code
fn department(code: &str, name: &str, parent: Option<&str>) -> Department {
    Department {
        id: Some(code.to_string()),
        code: code.to_string(),
        name: name.to_string(),
        parent: parent.map(EntityRef::new),
        ..Department::default()
    }
}

fn role(code: &str, name: &str, acl_type: i32) -> Role {
    Role {
        code: code.to_string(),
        name: name.to_string(),
        acl_type,
        ..Role::default()
    }
}

fn user(signinid: &str, nick: &str, department: &str, acl_type: i32) -> User {
    User {
        signinid: signinid.to_string(),
        nick: nick.to_string(),
        email: Some(format!("{}@example.com", signinid)),
        acl_code: Some(department.to_string()),
        acl_type,
        department: Some(EntityRef::new(department)),
        enabled: true,
        ..User::default()
    }
}

/// Load a small organization: a department tree, the reserved roles plus a
/// regular one, and a few users. Does nothing when departments already exist.
pub async fn load_seed_data<S: DomainStore>(store: &S) -> Result<()> {
    let existing = EntityStore::<Department>::find_all(store, &GroupFilter::new(), &[]).await?;
    if !existing.is_empty() {
        info!("Seed data already present ({} departments), skipping", existing.len());
        return Ok(());
    }

    let audit = AuditContext::system("seed");

    let departments = [
        department("D10", "Headquarters", None),
        department("D1010", "Engineering", Some("D10")),
        department("D1020", "Finance", Some("D10")),
        department("D20", "Field Sales", None),
    ];
    for mut entry in departments {
        entry.on_create(&audit.actor, chrono::Utc::now());
        EntityStore::<Department>::save(store, entry, &audit)
            .await
            .context("Failed to seed department")?;
    }

    let roles = [
        role("ROLE_ADMIN", "Administrator", 9),
        role("ROLE_ANONYMOUSLY", "Anonymous", 0),
        role("ROLE_OPS", "Operations", 2),
    ];
    for mut entry in roles {
        entry.on_create(&audit.actor, chrono::Utc::now());
        EntityStore::<Role>::save(store, entry, &audit)
            .await
            .context("Failed to seed role")?;
    }

    let users = [
        user("admin", "Administrator", "D10", 9),
        user("erin", "Erin", "D1010", 2),
        user("sam", "Sam", "D20", 1),
    ];
    for mut entry in users {
        entry.on_create(&audit.actor, chrono::Utc::now());
        EntityStore::<User>::save(store, entry, &audit)
            .await
            .context("Failed to seed user")?;
    }

    info!("Seed data loaded: 4 departments, 3 roles, 3 users");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let store = MemoryStore::new();
        load_seed_data(&store).await.unwrap();
        load_seed_data(&store).await.unwrap();

        let departments = EntityStore::<Department>::find_all(&store, &GroupFilter::new(), &[])
            .await
            .unwrap();
        let users = EntityStore::<User>::find_all(&store, &GroupFilter::new(), &[])
            .await
            .unwrap();
        assert_eq!(departments.len(), 4);
        assert_eq!(users.len(), 3);
        assert!(users.iter().all(|u| u.id.map_or(false, |id| id > 0)));
    }
}
