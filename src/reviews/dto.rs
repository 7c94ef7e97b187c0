use serde::Deserialize;
use uuid::Uuid;

/// Review creation body. On the nested tour route the tour id comes from
/// the path; the author is always the authenticated caller.
#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub review: String,
    pub rating: i32,
    pub tour: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub review: Option<String>,
    pub rating: Option<i32>,
}

/// Field checks shared by create (both fields present) and update (only
/// the supplied fields are checked).
pub(crate) fn review_problems(review: Option<&str>, rating: Option<i32>) -> Vec<String> {
    let mut problems = Vec::new();
    if review.is_some_and(|r| r.trim().is_empty()) {
        problems.push("A review cannot be empty".to_string());
    }
    if rating.is_some_and(|r| !(1..=5).contains(&r)) {
        problems.push("A review must have a rating between 1 and 5".to_string());
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_must_be_in_range() {
        assert!(review_problems(Some("Lovely tour"), Some(5)).is_empty());
        assert!(review_problems(Some("Lovely tour"), Some(1)).is_empty());
        assert_eq!(review_problems(Some("Lovely tour"), Some(0)).len(), 1);
        assert_eq!(review_problems(Some("Lovely tour"), Some(6)).len(), 1);
    }

    #[test]
    fn empty_review_and_bad_rating_aggregate() {
        assert_eq!(review_problems(Some("   "), Some(9)).len(), 2);
    }

    #[test]
    fn absent_fields_are_not_checked() {
        assert!(review_problems(None, None).is_empty());
        assert!(review_problems(None, Some(3)).is_empty());
    }
}
