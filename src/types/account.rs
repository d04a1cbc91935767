use chrono::prelude::*;
use handle_errors::Error;
use serde::{Deserialize, Serialize};

const MAX_EMAIL_LENGTH: usize = 254;
const MAX_NAME_LENGTH: usize = 150;

/// A user row as stored, password hash included. Never serialized.
#[derive(Clone, Debug)]
pub struct Account {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl NewAccount {
    pub fn validate(&self) -> Result<(), Error> {
        required("email", &self.email, MAX_EMAIL_LENGTH)?;
        if !self.email.contains('@') {
            return Err(Error::validation("email", "Enter a valid email address."));
        }
        required("username", &self.username, MAX_NAME_LENGTH)?;
        if !self
            .username
            .chars()
            .all(|c| c.is_alphanumeric() || "_.@+-".contains(c))
        {
            return Err(Error::validation(
                "username",
                "Enter a valid username. It may contain only letters, numbers, and @/./+/-/_ characters.",
            ));
        }
        required("first_name", &self.first_name, MAX_NAME_LENGTH)?;
        required("last_name", &self.last_name, MAX_NAME_LENGTH)?;
        required("password", &self.password, usize::MAX)?;
        Ok(())
    }
}

fn required(field: &'static str, value: &str, max: usize) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "This field may not be blank."));
    }
    if value.chars().count() > max {
        return Err(Error::validation(
            field,
            format!("Ensure this field has no more than {} characters.", max),
        ));
    }
    Ok(())
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AccountCreated {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<Account> for AccountCreated {
    fn from(account: Account) -> Self {
        AccountCreated {
            id: account.id,
            email: account.email,
            username: account.username,
            first_name: account.first_name,
            last_name: account.last_name,
        }
    }
}

/// The public view of a user, relative to whoever is asking.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

#[derive(Deserialize, Clone, Debug)]
pub struct Login {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Debug)]
pub struct AuthToken {
    pub auth_token: String,
}

#[derive(Deserialize, Debug)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize, Debug)]
pub struct CurrentPassword {
    pub current_password: String,
}

/// Claims carried by an auth token, plus the token text it came from.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Session {
    pub exp: DateTime<Utc>,
    pub user_id: i32,
    pub nbf: DateTime<Utc>,
    #[serde(skip)]
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> NewAccount {
        NewAccount {
            email: "cook@example.com".to_string(),
            username: "cook_1".to_string(),
            first_name: "Ann".to_string(),
            last_name: "Cook".to_string(),
            password: "s3cret-pass".to_string(),
        }
    }

    #[test]
    fn accepts_valid_account() {
        assert!(account().validate().is_ok());
    }

    #[test]
    fn rejects_blank_fields() {
        let mut a = account();
        a.first_name = "  ".to_string();
        assert!(matches!(
            a.validate(),
            Err(Error::Validation { field: "first_name", .. })
        ));
    }

    #[test]
    fn rejects_bad_email_and_username() {
        let mut a = account();
        a.email = "not-an-email".to_string();
        assert!(matches!(a.validate(), Err(Error::Validation { field: "email", .. })));

        let mut a = account();
        a.username = "has space".to_string();
        assert!(matches!(a.validate(), Err(Error::Validation { field: "username", .. })));
    }

    #[test]
    fn rejects_overlong_names() {
        let mut a = account();
        a.last_name = "x".repeat(151);
        assert!(matches!(a.validate(), Err(Error::Validation { field: "last_name", .. })));
    }
}
