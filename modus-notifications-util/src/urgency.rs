/// Urgency level, freedesktop.org wire values 0..=2.
///
/// Critical notifications are exempt from auto-expiry and eviction
/// preference; the ordering derive reflects that ranking.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(u8)]
pub enum NotificationUrgency {
    Low = 0,
    #[default]
    Normal = 1,
    Critical = 2,
}

impl From<u8> for NotificationUrgency {
    /// Out-of-range wire values degrade to Normal rather than erroring
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Low,
            2 => Self::Critical,
            _ => Self::Normal,
        }
    }
}
