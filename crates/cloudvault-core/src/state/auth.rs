use super::LoadStatus;
use crate::models::User;

#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub user: Option<User>,
    pub is_admin: bool,
    pub status: LoadStatus,
    pub error: Option<String>,
}

impl AuthState {
    pub fn logging_in(&mut self) {
        self.status = LoadStatus::Loading;
        self.error = None;
    }

    pub fn logged_in(&mut self, user: User) {
        self.is_admin = user.has_admin_access();
        self.user = Some(user);
        self.status = LoadStatus::Succeeded;
    }

    pub fn failed(&mut self, error: impl ToString) {
        self.status = LoadStatus::Failed;
        self.error = Some(error.to_string());
    }

    pub fn logged_out(&mut self) {
        *self = Self::default();
    }

    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_lifecycle() {
        let user: User = serde_json::from_str(
            r#"{"id": 1, "username": "root", "is_admin": true, "is_staff": true, "total_file_size": null, "files_count": null, "date_joined": null}"#,
        )
        .unwrap();

        let mut state = AuthState::default();
        state.logging_in();
        assert!(state.status.is_busy());

        state.logged_in(user);
        assert!(state.is_logged_in());
        assert!(state.is_admin);

        state.logged_out();
        assert!(!state.is_logged_in());
        assert!(!state.is_admin);
        assert_eq!(state.status, LoadStatus::Idle);
    }

    #[test]
    fn test_failed_login_keeps_error() {
        let mut state = AuthState::default();
        state.logging_in();
        state.failed("Unauthorized - token may be expired");
        assert_eq!(state.status, LoadStatus::Failed);
        assert!(state.error.is_some());
        assert!(!state.is_logged_in());
    }
}
