//! Startup seeding
//!
//! A fresh store gets one fixed admin account, which becomes the first
//! admin, plus a number of generated student accounts for demos.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{info, warn};

use super::schemas::{NewUser, Role, User};
use super::store::MemStorage;
use crate::auth::hash_password;
use crate::types::{Result, StudyhallError};

/// Password shared by every generated sample account
pub const SAMPLE_PASSWORD: &str = "student123";

const FIRST_NAMES: &[&str] = &[
    "Amara", "Ben", "Chen", "Dalia", "Emeka", "Freya", "Gabriel", "Hana", "Ivan", "Jun",
    "Kofi", "Lena", "Mateo", "Nadia", "Omar", "Priya", "Quinn", "Rosa", "Sami", "Tara",
];

const LAST_NAMES: &[&str] = &[
    "Okafor", "Schmidt", "Wang", "Haddad", "Eze", "Larsen", "Costa", "Sato", "Petrov",
    "Kim", "Mensah", "Novak", "Garcia", "Rahman", "Aziz", "Patel", "Murphy", "Silva",
];

const INSTITUTIONS: &[&str] = &[
    "Northfield University",
    "Riverside Institute of Technology",
    "St. Aldric College",
    "Eastbrook State University",
];

const DEPARTMENTS: &[&str] = &[
    "Computer Science",
    "Mathematics",
    "Physics",
    "Biology",
    "Economics",
    "Mechanical Engineering",
];

#[derive(Debug, Clone)]
pub struct SeedOptions {
    pub admin_username: String,
    pub admin_email: String,
    pub admin_password: String,
    pub sample_users: usize,
}

#[derive(Debug)]
pub struct SeedReport {
    pub admin: User,
    pub sample_users: usize,
}

/// Generate `count` sample profiles with unique usernames and emails
fn sample_profiles(count: usize, password_hash: &str) -> Vec<NewUser> {
    let mut rng = rand::thread_rng();
    (1..=count)
        .map(|n| {
            let first = FIRST_NAMES.choose(&mut rng).copied().unwrap_or("Student");
            let last = LAST_NAMES.choose(&mut rng).copied().unwrap_or("Sample");
            let username = format!("{}.{}{}", first, last, n).to_lowercase();
            NewUser {
                email: format!("{}@students.example.edu", username),
                username,
                password_hash: password_hash.to_string(),
                display_name: format!("{} {}", first, last),
                bio: Some(format!("Hi, I'm {}!", first)),
                institution: INSTITUTIONS.choose(&mut rng).map(|s| s.to_string()),
                department: DEPARTMENTS.choose(&mut rng).map(|s| s.to_string()),
                year_of_study: Some(rng.gen_range(1..=4)),
                avatar: None,
                role: Role::Regular,
            }
        })
        .collect()
}

/// Seed the admin and sample accounts into `store`
pub async fn seed(store: &MemStorage, options: &SeedOptions) -> Result<SeedReport> {
    let admin = store
        .create_user(NewUser {
            username: options.admin_username.clone(),
            email: options.admin_email.clone(),
            password_hash: hash_password(&options.admin_password)?,
            display_name: "Administrator".to_string(),
            role: Role::Admin,
            ..Default::default()
        })
        .await?;

    if store.first_admin_id().await != Some(admin.id) {
        return Err(StudyhallError::Internal(
            "Seeded admin did not become the first admin".to_string(),
        ));
    }

    let mut created = 0;
    if options.sample_users > 0 {
        let sample_hash = hash_password(SAMPLE_PASSWORD)?;
        for profile in sample_profiles(options.sample_users, &sample_hash) {
            let username = profile.username.clone();
            match store.create_user(profile).await {
                Ok(_) => created += 1,
                Err(e) => warn!(username = %username, error = %e, "Skipping sample user"),
            }
        }
    }

    info!(
        admin = %admin.username,
        sample_users = created,
        "Store seeded"
    );
    Ok(SeedReport {
        admin,
        sample_users: created,
    })
}
