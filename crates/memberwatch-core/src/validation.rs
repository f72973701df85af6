//! Sanity checks for API payloads and configuration.
//!
//! The MemberPress API is loosely typed; these checks catch obviously
//! broken data before it reaches the UI or the notification feed.

use memberwatch_api::{parse_timestamp, Credentials, Member, Subscription};

const VALID_SUBSCRIPTION_STATUSES: [&str; 4] = ["active", "cancelled", "pending", "suspended"];

/// Outcome of validating one object
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn check(&mut self, ok: bool, message: &str) {
        if !ok {
            self.errors.push(message.to_string());
        }
    }
}

/// Validate an API configuration before it is saved
pub fn validate_api_config(credentials: &Credentials) -> ValidationReport {
    let mut report = ValidationReport::default();
    let base_url = credentials.base_url.trim();

    report.check(!base_url.is_empty(), "Base URL is required");
    if !base_url.is_empty() {
        report.check(is_valid_url(base_url), "Invalid base URL format");
    }
    report.check(!credentials.api_key.trim().is_empty(), "API Key is required");

    report
}

pub fn validate_member(member: &Member) -> ValidationReport {
    let mut report = ValidationReport::default();

    report.check(!member.email.is_empty(), "Email is required");
    if !member.email.is_empty() {
        report.check(is_valid_email(&member.email), "Invalid email format");
    }
    report.check(!member.username.is_empty(), "Username is required");
    report.check(
        parse_timestamp(&member.registered_at).is_some(),
        "Invalid registration date",
    );

    report
}

pub fn validate_subscription(subscription: &Subscription) -> ValidationReport {
    let mut report = ValidationReport::default();

    report.check(subscription.member.id != 0, "Member is required");
    report.check(!subscription.membership.is_null(), "Membership is required");
    report.check(
        subscription.price.trim().parse::<f64>().is_ok(),
        "Invalid price",
    );
    report.check(
        subscription.total.trim().parse::<f64>().is_ok(),
        "Invalid total",
    );
    report.check(
        VALID_SUBSCRIPTION_STATUSES.contains(&subscription.status.as_str()),
        "Invalid subscription status",
    );
    report.check(
        parse_timestamp(&subscription.created_at).is_some(),
        "Invalid creation date",
    );

    report
}

/// Minimal email shape check: one `@`, a non-empty local part, and a
/// dotted domain. Deliverability is the mail server's problem.
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

fn is_valid_url(url: &str) -> bool {
    let rest = if let Some(rest) = url.strip_prefix("https://") {
        rest
    } else if let Some(rest) = url.strip_prefix("http://") {
        rest
    } else {
        return false;
    };
    !rest.is_empty() && !rest.starts_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_shapes() {
        assert!(is_valid_email("jane@example.com"));
        assert!(is_valid_email("j.doe+tag@sub.example.org"));

        assert!(!is_valid_email("jane"));
        assert!(!is_valid_email("jane@"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("jane@example"));
        assert!(!is_valid_email("jane doe@example.com"));
        assert!(!is_valid_email("jane@.com"));
    }

    #[test]
    fn test_url_shapes() {
        assert!(is_valid_url("https://example.com"));
        assert!(is_valid_url("http://example.com/blog"));

        assert!(!is_valid_url("example.com"));
        assert!(!is_valid_url("ftp://example.com"));
        assert!(!is_valid_url("https://"));
    }

    #[test]
    fn test_validate_api_config() {
        let report = validate_api_config(&Credentials::new("https://example.com", "key"));
        assert!(report.is_valid());

        let report = validate_api_config(&Credentials::default());
        assert_eq!(report.errors.len(), 2);

        let report = validate_api_config(&Credentials::new("not-a-url", "key"));
        assert_eq!(report.errors, vec!["Invalid base URL format"]);
    }

    #[test]
    fn test_validate_member() {
        let member: Member = serde_json::from_value(serde_json::json!({
            "id": 1,
            "email": "jane@example.com",
            "username": "jane",
            "registered_at": "2024-03-01 10:30:00"
        }))
        .unwrap();
        assert!(validate_member(&member).is_valid());

        let member: Member = serde_json::from_value(serde_json::json!({
            "id": 2,
            "email": "broken",
            "registered_at": "yesterday-ish"
        }))
        .unwrap();
        let report = validate_member(&member);
        assert!(!report.is_valid());
        assert!(report.errors.contains(&"Invalid email format".to_string()));
        assert!(report.errors.contains(&"Username is required".to_string()));
        assert!(report
            .errors
            .contains(&"Invalid registration date".to_string()));
    }

    #[test]
    fn test_validate_subscription() {
        let sub: Subscription = serde_json::from_value(serde_json::json!({
            "id": 1,
            "member": { "id": 7, "email": "jane@example.com" },
            "membership": { "id": 3, "title": "Gold" },
            "price": "19.99",
            "total": "19.99",
            "status": "active",
            "created_at": "2024-01-15 00:00:00"
        }))
        .unwrap();
        assert!(validate_subscription(&sub).is_valid());

        let sub: Subscription = serde_json::from_value(serde_json::json!({
            "id": 2,
            "status": "limbo",
            "price": "free"
        }))
        .unwrap();
        let report = validate_subscription(&sub);
        assert!(report.errors.contains(&"Member is required".to_string()));
        assert!(report
            .errors
            .contains(&"Invalid subscription status".to_string()));
        assert!(report.errors.contains(&"Invalid price".to_string()));
    }
}
