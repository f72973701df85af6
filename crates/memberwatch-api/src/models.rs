use chrono::{DateTime, Months, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A member account on the MemberPress site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    #[serde(deserialize_with = "de::flexible_u64")]
    pub id: u64,
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub registered_at: String,
    #[serde(default, deserialize_with = "de::flexible_u32")]
    pub active_txn_count: u32,
    #[serde(default, deserialize_with = "de::flexible_u32")]
    pub expired_txn_count: u32,
}

impl Member {
    /// Display name, falling back to the username when both name fields are blank
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string();
        if name.is_empty() {
            self.username.clone()
        } else {
            name
        }
    }

    /// A member counts as active while they hold at least one active transaction
    pub fn is_active(&self) -> bool {
        self.active_txn_count > 0
    }

    pub fn total_transactions(&self) -> u32 {
        self.active_txn_count + self.expired_txn_count
    }
}

/// Member summary embedded in subscriptions and transactions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberRef {
    #[serde(default, deserialize_with = "de::flexible_u64")]
    pub id: u64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// A recurring subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(deserialize_with = "de::flexible_u64")]
    pub id: u64,
    #[serde(default)]
    pub member: MemberRef,
    #[serde(default)]
    pub membership: serde_json::Value,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub total: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "de::flexible_u32")]
    pub period: u32,
    #[serde(default)]
    pub period_type: String,
    #[serde(default)]
    pub created_at: String,
}

impl Subscription {
    /// Projected next billing date.
    ///
    /// MemberPress does not expose this directly, so we extrapolate from
    /// the start date and billing period: advance from the start in
    /// whole billing periods until we pass `now`. None for anything that
    /// is not an active monthly or yearly subscription.
    pub fn next_payment_date(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.status != "active" {
            return None;
        }
        let start = parse_timestamp(&self.created_at)?;
        if self.period == 0 {
            return None;
        }

        let elapsed = now.signed_duration_since(start);
        let months = match self.period_type.as_str() {
            "months" => {
                let approx_months = (elapsed.num_days() as f64 / 30.0).ceil().max(1.0) as u32;
                approx_months * self.period
            }
            "years" => {
                let approx_years = (elapsed.num_days() as f64 / 365.0).ceil().max(1.0) as u32;
                approx_years * self.period * 12
            }
            _ => return None,
        };

        start.checked_add_months(Months::new(months))
    }
}

/// A one-off or recurring payment transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(deserialize_with = "de::flexible_u64")]
    pub id: u64,
    #[serde(default)]
    pub member: MemberRef,
    #[serde(default)]
    pub total: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub expires_at: String,
}

/// Parse the timestamp formats MemberPress actually emits.
///
/// The REST API mostly sends MySQL-style `YYYY-MM-DD HH:MM:SS` (UTC),
/// but some fields come through as RFC 3339. Accept both.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

mod de {
    use serde::{Deserialize, Deserializer};

    /// WordPress is not picky about number types: counts and ids arrive
    /// as numbers or as quoted strings depending on the plugin version.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    pub fn flexible_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        }
    }

    pub fn flexible_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        flexible_u64(deserializer).map(|n| n as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    fn member_json() -> serde_json::Value {
        serde_json::json!({
            "id": "42",
            "email": "jane@example.com",
            "username": "jane",
            "first_name": "Jane",
            "last_name": "Doe",
            "registered_at": "2024-03-01 10:30:00",
            "active_txn_count": "2",
            "expired_txn_count": 1
        })
    }

    #[test]
    fn test_member_flexible_numbers() {
        let member: Member = serde_json::from_value(member_json()).unwrap();
        assert_eq!(member.id, 42);
        assert_eq!(member.active_txn_count, 2);
        assert_eq!(member.total_transactions(), 3);
        assert!(member.is_active());
    }

    #[test]
    fn test_full_name_falls_back_to_username() {
        let mut member: Member = serde_json::from_value(member_json()).unwrap();
        assert_eq!(member.full_name(), "Jane Doe");

        member.first_name.clear();
        member.last_name.clear();
        assert_eq!(member.full_name(), "jane");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let mysql = parse_timestamp("2024-03-01 10:30:00").unwrap();
        assert_eq!(mysql, Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap());

        let rfc = parse_timestamp("2024-03-01T10:30:00Z").unwrap();
        assert_eq!(rfc, mysql);

        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("not a date").is_none());
    }

    #[test]
    fn test_next_payment_date_monthly() {
        let sub: Subscription = serde_json::from_value(serde_json::json!({
            "id": 1,
            "status": "active",
            "period": 1,
            "period_type": "months",
            "created_at": "2024-01-15 00:00:00"
        }))
        .unwrap();

        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let next = sub.next_payment_date(now).unwrap();
        assert!(next > now);
        assert_eq!(next.day(), 15);
    }

    #[test]
    fn test_next_payment_date_requires_active() {
        let sub: Subscription = serde_json::from_value(serde_json::json!({
            "id": 1,
            "status": "cancelled",
            "period": 1,
            "period_type": "months",
            "created_at": "2024-01-15 00:00:00"
        }))
        .unwrap();

        assert!(sub.next_payment_date(Utc::now()).is_none());
    }

    #[test]
    fn test_subscription_defaults_for_sparse_payload() {
        let sub: Subscription = serde_json::from_value(serde_json::json!({ "id": 9 })).unwrap();
        assert_eq!(sub.status, "");
        assert_eq!(sub.member.email, "");
        assert!(sub.next_payment_date(Utc::now()).is_none());
    }
}
