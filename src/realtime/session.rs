//! Per-connection session state.

/// Credential, derived user id and request-id counter for one connection.
///
/// A fresh `Session` is installed on every (re)connect via [`Session::next_generation`].
/// The request-id counter carries over so ids from a previous connection
/// can never collide with new ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    generation: u64,
    credential: Option<String>,
    user_id: Option<String>,
    next_request_id: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            generation: 1,
            credential: None,
            user_id: None,
            next_request_id: 1,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session for the next connection. Keeps the credential, user id and
    /// id counter; bumps the generation.
    pub fn next_generation(&self) -> Self {
        Self {
            generation: self.generation + 1,
            credential: self.credential.clone(),
            user_id: self.user_id.clone(),
            next_request_id: self.next_request_id,
        }
    }

    /// Allocate the next request id.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    pub fn set_credential(&mut self, credential: impl Into<String>) {
        self.credential = Some(credential.into());
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn set_user_id(&mut self, user_id: impl Into<String>) {
        self.user_id = Some(user_id.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_strictly_increase() {
        let mut session = Session::new();
        let ids: Vec<u64> = (0..5).map(|_| session.next_id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_next_generation_keeps_counter_and_credential() {
        let mut session = Session::new();
        session.set_credential("token");
        session.set_user_id("u1");
        session.next_id();
        session.next_id();

        let mut renewed = session.next_generation();
        assert_eq!(renewed.generation(), 2);
        assert_eq!(renewed.credential(), Some("token"));
        assert_eq!(renewed.user_id(), Some("u1"));
        assert_eq!(renewed.next_id(), 3);
    }

    #[test]
    fn test_fresh_session_has_no_credential() {
        let session = Session::new();
        assert_eq!(session.generation(), 1);
        assert_eq!(session.credential(), None);
        assert_eq!(session.user_id(), None);
    }
}
