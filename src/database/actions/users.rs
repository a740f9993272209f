use chrono::Duration;
use sqlx::{Pool, Postgres};

use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::generate_jwt_session,
    },
    constants::{MAX_EMAIL_LENGTH, MAX_USER_FIELD_LENGTH},
    error::FoodgramError,
    pagination::{needs_recount, PageContext, PageQuery},
    schema::{Id, RegisterPayload, User, UserProfile, UserProfileRow},
};

const LOGIN_FAILED: &str = "Unable to log in with provided credentials.";

pub async fn get_user_by_email(
    pool: &Pool<Postgres>,
    email: &str,
) -> Result<Option<User>, FoodgramError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn get_user_by_id(pool: &Pool<Postgres>, user_id: Id) -> Result<Option<User>, FoodgramError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Public profile of `user_id`, with `is_subscribed` seen from `viewer`.
pub async fn get_profile(
    viewer: Option<Id>,
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<UserProfile, FoodgramError> {
    let row: Option<UserProfile> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
            EXISTS (SELECT 1 FROM follows f WHERE f.user_id = $1 AND f.author_id = u.id) AS is_subscribed
        FROM users u
        WHERE u.id = $2
    ",
    )
    .bind(viewer)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.ok_or(FoodgramError::DoesNotExist("User"))
}

pub async fn list_profiles(
    viewer: Option<Id>,
    authors: &[Id],
    pool: &Pool<Postgres>,
) -> Result<Vec<UserProfile>, FoodgramError> {
    let rows: Vec<UserProfile> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
            EXISTS (SELECT 1 FROM follows f WHERE f.user_id = $1 AND f.author_id = u.id) AS is_subscribed
        FROM users u
        WHERE u.id = ANY($2)
    ",
    )
    .bind(viewer)
    .bind(authors)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn fetch_users(
    viewer: Option<Id>,
    query: PageQuery,
    default_page_size: i64,
    pool: &Pool<Postgres>,
) -> Result<PageContext<UserProfile>, FoodgramError> {
    let page_size = query.page_size(default_page_size);
    let offset = query.offset(page_size);

    let rows: Vec<UserProfileRow> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
            EXISTS (SELECT 1 FROM follows f WHERE f.user_id = $1 AND f.author_id = u.id) AS is_subscribed,
            COUNT(*) OVER() AS count
        FROM users u
        ORDER BY u.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(viewer)
    .bind(page_size)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total_count = match rows.first() {
        Some(row) => row.count,
        None if needs_recount(&rows, offset) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM users")
                .fetch_one(pool)
                .await?
        }
        None => 0,
    };
    Ok(PageContext::from_rows(rows, total_count, page_size, offset).map(UserProfile::from))
}

fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), FoodgramError> {
    if value.trim().is_empty() {
        return Err(FoodgramError::validation(field, "This field may not be blank."));
    }
    if value.chars().count() > max {
        return Err(FoodgramError::validation(
            field,
            format!("Ensure this field has no more than {max} characters."),
        ));
    }
    Ok(())
}

pub fn validate_registration(payload: &RegisterPayload) -> Result<(), FoodgramError> {
    check_length("email", &payload.email, MAX_EMAIL_LENGTH)?;
    if !payload.email.contains('@') {
        return Err(FoodgramError::validation("email", "Enter a valid email address."));
    }

    check_length("username", &payload.username, MAX_USER_FIELD_LENGTH)?;
    let valid_username = payload
        .username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
    if !valid_username {
        return Err(FoodgramError::validation(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        ));
    }

    if payload.first_name.chars().count() > MAX_USER_FIELD_LENGTH {
        return Err(FoodgramError::validation("first_name", "Value is too long."));
    }
    if payload.last_name.chars().count() > MAX_USER_FIELD_LENGTH {
        return Err(FoodgramError::validation("last_name", "Value is too long."));
    }

    check_length("password", &payload.password, MAX_USER_FIELD_LENGTH)?;
    Ok(())
}

// Emails are unique ignoring case, so login by email finds at most one user
fn registration_conflict(constraint: Option<&str>) -> Option<FoodgramError> {
    match constraint? {
        "users_email_key" | "users_email_lower" => Some(FoodgramError::validation(
            "email",
            "A user with that email already exists.",
        )),
        "users_username_key" => Some(FoodgramError::validation(
            "username",
            "A user with that username already exists.",
        )),
        _ => None,
    }
}

/// Creates a user; the password is stored as an argon2 hash.
pub async fn register_user(
    payload: RegisterPayload,
    pool: &Pool<Postgres>,
) -> Result<UserProfile, FoodgramError> {
    validate_registration(&payload)?;
    let password = hash_password(&payload.password)?;

    let profile: UserProfile = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, email, username, first_name, last_name, FALSE AS is_subscribed
    ",
    )
    .bind(payload.email.trim())
    .bind(payload.username.trim())
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(password)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        let constraint = e
            .as_database_error()
            .and_then(|d| d.constraint())
            .map(str::to_owned);
        registration_conflict(constraint.as_deref()).unwrap_or_else(|| FoodgramError::from(e))
    })?;

    log::info!("Registered user {} ({})", profile.username, profile.id);
    Ok(profile)
}

pub async fn login_user(
    email: &str,
    password: &str,
    secret: &[u8],
    lifetime: Duration,
    pool: &Pool<Postgres>,
) -> Result<String, FoodgramError> {
    let user = get_user_by_email(pool, email)
        .await?
        .ok_or_else(|| FoodgramError::validation("non_field_errors", LOGIN_FAILED))?;

    if !verify_password(password, &user.password)? {
        return Err(FoodgramError::validation("non_field_errors", LOGIN_FAILED));
    }

    generate_jwt_session(&user, secret, lifetime)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> RegisterPayload {
        RegisterPayload {
            email: String::from("cook@example.com"),
            username: String::from("cook.42"),
            first_name: String::from("Ivan"),
            last_name: String::from("Petrov"),
            password: String::from("s3cret-pass"),
        }
    }

    fn field_of(result: Result<(), FoodgramError>) -> &'static str {
        match result {
            Err(FoodgramError::Validation { field, .. }) => field,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_valid_registration() {
        assert!(validate_registration(&payload()).is_ok());
    }

    #[test]
    fn rejects_bad_email() {
        let mut p = payload();
        p.email = String::from("not-an-email");
        assert_eq!(field_of(validate_registration(&p)), "email");
    }

    #[test]
    fn rejects_bad_username() {
        let mut p = payload();
        p.username = String::from("two words");
        assert_eq!(field_of(validate_registration(&p)), "username");

        p.username = "x".repeat(MAX_USER_FIELD_LENGTH + 1);
        assert_eq!(field_of(validate_registration(&p)), "username");
    }

    #[test]
    fn email_conflicts_report_the_email_field() {
        for constraint in ["users_email_key", "users_email_lower"] {
            match registration_conflict(Some(constraint)) {
                Some(FoodgramError::Validation { field, .. }) => assert_eq!(field, "email"),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(matches!(
            registration_conflict(Some("users_username_key")),
            Some(FoodgramError::Validation { field: "username", .. })
        ));
        assert!(registration_conflict(Some("users_pkey")).is_none());
        assert!(registration_conflict(None).is_none());
    }

    #[test]
    fn rejects_blank_password() {
        let mut p = payload();
        p.password = String::from("   ");
        assert_eq!(field_of(validate_registration(&p)), "password");
    }
}
