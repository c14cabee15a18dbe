//! Recommendation form, validated locally before submit

use crate::agent::{RecommendRequest, Tags};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please tell us your mood")]
    MissingMood,

    #[error("Please tell us what you are doing")]
    MissingActivity,
}

#[derive(Debug, Clone, Default)]
pub struct RecommendForm {
    pub mood: String,
    pub activity: String,
    pub location: String,
    pub tags: String,
}

impl RecommendForm {
    pub fn new(mood: impl Into<String>, activity: impl Into<String>) -> Self {
        Self {
            mood: mood.into(),
            activity: activity.into(),
            ..Default::default()
        }
    }

    /// Build the request body, or say which required field is blank
    pub fn validate(&self) -> Result<RecommendRequest, ValidationError> {
        let mood = self.mood.trim();
        let activity = self.activity.trim();
        if mood.is_empty() {
            return Err(ValidationError::MissingMood);
        }
        if activity.is_empty() {
            return Err(ValidationError::MissingActivity);
        }

        let location = self.location.trim();
        let tags = self.tags.trim();
        Ok(RecommendRequest {
            mood: mood.to_string(),
            activity: activity.to_string(),
            location: (!location.is_empty()).then(|| location.to_string()),
            tags: (!tags.is_empty()).then(|| Tags::Text(tags.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_fields_rejected() {
        assert_eq!(
            RecommendForm::new("", "run").validate().unwrap_err(),
            ValidationError::MissingMood
        );
        assert_eq!(
            RecommendForm::new("happy", "  ").validate().unwrap_err(),
            ValidationError::MissingActivity
        );
    }

    #[test]
    fn test_optional_fields_dropped_when_blank() {
        let request = RecommendForm::new(" happy ", "run").validate().unwrap();
        assert_eq!(request.mood, "happy");
        assert!(request.location.is_none());
        assert!(request.tags.is_none());

        let mut form = RecommendForm::new("calm", "read");
        form.location = "Lisbon".into();
        form.tags = "piano, rain".into();
        let request = form.validate().unwrap();
        assert_eq!(request.location.as_deref(), Some("Lisbon"));
        assert_eq!(request.tags, Some(Tags::Text("piano, rain".into())));
    }
}
