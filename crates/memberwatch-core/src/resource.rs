use crate::settings::NotificationSettings;

/// The four polled event feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    NewMembers,
    FailedPayments,
    CanceledSubscriptions,
    ExpiringMemberships,
}

impl ResourceType {
    pub const ALL: [ResourceType; 4] = [
        ResourceType::NewMembers,
        ResourceType::FailedPayments,
        ResourceType::CanceledSubscriptions,
        ResourceType::ExpiringMemberships,
    ];

    /// Stable key for the persisted checkpoint of this feed
    pub fn storage_key(&self) -> &'static str {
        match self {
            ResourceType::NewMembers => "last_check.new_members",
            ResourceType::FailedPayments => "last_check.failed_payments",
            ResourceType::CanceledSubscriptions => "last_check.canceled_subscriptions",
            ResourceType::ExpiringMemberships => "last_check.expiring_memberships",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResourceType::NewMembers => "new members",
            ResourceType::FailedPayments => "failed payments",
            ResourceType::CanceledSubscriptions => "canceled subscriptions",
            ResourceType::ExpiringMemberships => "expiring memberships",
        }
    }

    /// Whether this feed should be polled under the given settings.
    /// The master toggle wins; each feed is also individually toggleable.
    pub fn enabled_in(&self, settings: &NotificationSettings) -> bool {
        if !settings.enabled {
            return false;
        }
        match self {
            ResourceType::NewMembers => settings.new_members,
            ResourceType::FailedPayments => settings.failed_payments,
            ResourceType::CanceledSubscriptions => settings.canceled_subscriptions,
            ResourceType::ExpiringMemberships => settings.expiring_memberships,
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_toggle_wins() {
        let mut settings = NotificationSettings::default();
        settings.enabled = false;
        for resource in ResourceType::ALL {
            assert!(!resource.enabled_in(&settings));
        }
    }

    #[test]
    fn test_individual_toggles() {
        let mut settings = NotificationSettings::default();
        settings.failed_payments = false;

        assert!(!ResourceType::FailedPayments.enabled_in(&settings));
        assert!(ResourceType::NewMembers.enabled_in(&settings));
        assert!(ResourceType::CanceledSubscriptions.enabled_in(&settings));
    }

    #[test]
    fn test_storage_keys_are_distinct() {
        let mut keys: Vec<_> = ResourceType::ALL.iter().map(|r| r.storage_key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), ResourceType::ALL.len());
    }
}
