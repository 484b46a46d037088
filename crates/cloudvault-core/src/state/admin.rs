use super::LoadStatus;
use crate::models::User;
use crate::utils::contains_ignore_case;

#[derive(Debug, Clone, Default)]
pub struct AdminState {
    pub users: Vec<User>,
    pub status: LoadStatus,
    pub error: Option<String>,
}

impl AdminState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) {
        self.status = LoadStatus::Loading;
        self.error = None;
    }

    pub fn loaded(&mut self, users: Vec<User>) {
        self.users = users;
        self.status = LoadStatus::Succeeded;
    }

    pub fn user_removed(&mut self, user_id: i64) {
        self.users.retain(|u| u.id != user_id);
    }

    pub fn user_updated(&mut self, updated: User) {
        if let Some(user) = self.users.iter_mut().find(|u| u.id == updated.id) {
            *user = updated;
        }
    }

    pub fn failed(&mut self, error: impl ToString) {
        self.status = LoadStatus::Failed;
        self.error = Some(error.to_string());
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Users whose username, email or full name contains `query`
    pub fn filtered(&self, query: &str) -> Vec<&User> {
        self.users
            .iter()
            .filter(|u| {
                contains_ignore_case(&u.username, query)
                    || contains_ignore_case(&u.email, query)
                    || contains_ignore_case(&u.full_name(), query)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, username: &str, email: &str, first: &str) -> User {
        User {
            id,
            username: username.to_string(),
            email: email.to_string(),
            first_name: first.to_string(),
            last_name: String::new(),
            is_admin: false,
            is_staff: false,
            total_file_size: None,
            files_count: None,
            date_joined: None,
        }
    }

    fn state() -> AdminState {
        let mut state = AdminState::new();
        state.begin();
        state.loaded(vec![
            user(1, "alice", "alice@example.com", "Alice"),
            user(2, "bob", "bob@corp.example", "Robert"),
        ]);
        state
    }

    #[test]
    fn test_filter_matches_any_name_field() {
        let state = state();
        assert_eq!(state.filtered("corp")[0].id, 2);
        assert_eq!(state.filtered("ROBERT")[0].id, 2);
        assert_eq!(state.filtered("ali").len(), 1);
        assert_eq!(state.filtered("").len(), 2);
    }

    #[test]
    fn test_update_and_remove() {
        let mut state = state();
        let mut promoted = user(2, "bob", "bob@corp.example", "Robert");
        promoted.is_staff = true;
        state.user_updated(promoted);
        assert!(state.users[1].has_admin_access());

        state.user_removed(1);
        assert_eq!(state.users.len(), 1);

        state.reset();
        assert!(state.users.is_empty());
        assert_eq!(state.status, LoadStatus::Idle);
    }
}
