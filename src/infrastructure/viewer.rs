use crate::error::{AppError, AppResult};
use crate::infrastructure::id_generator::DocId;

/// Who is making the current request. Built once per request by the middleware.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerContext {
    pub user_id: Option<DocId>,
    pub request_id: String,
}

impl ViewerContext {
    pub fn anonymous(request_id: String) -> Self {
        ViewerContext {
            user_id: None,
            request_id,
        }
    }

    pub fn authenticated(user_id: DocId, request_id: String) -> Self {
        ViewerContext {
            user_id: Some(user_id),
            request_id,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn require_user(&self) -> AppResult<&DocId> {
        self.user_id
            .as_ref()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_user() {
        let anonymous = ViewerContext::anonymous("req-1".into());
        assert!(!anonymous.is_authenticated());
        assert!(matches!(anonymous.require_user(), Err(AppError::Unauthorized(_))));

        let id = DocId::parse("64b7f0c2a1b2c3d4e5f60718").unwrap();
        let viewer = ViewerContext::authenticated(id.clone(), "req-2".into());
        assert_eq!(viewer.require_user().unwrap(), &id);
    }
}
