//! Device identity and the connection-profile rate limiter.
//!
//! The bitmask algorithm is implemented as free functions over
//! `&mut ConnectionProfile` rather than methods that also own the policy
//! (window/quota), per the Design Notes' resolution of the source's lazy
//! "ConnectionValidator" field: the policy lives on [`DeviceIdentity`],
//! the mutable mask lives on [`ConnectionProfile`], and the two are
//! threaded together explicitly at the call site.

use dmtp_protocol::SupportedEncodings;

/// A bitmask of connection occurrences, one bit per minute within the
/// configured rate-limit window. Bit 0 is always the most recent minute
/// relative to `last_connect_sec`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    bits: Vec<bool>,
    last_connect_sec: u32,
}

impl ConnectionProfile {
    /// A fresh profile with no recorded connections.
    #[must_use]
    pub fn new(window_minutes: u8) -> Self {
        Self {
            bits: vec![false; window_minutes.max(1) as usize],
            last_connect_sec: 0,
        }
    }

    /// Number of bits currently set within the window.
    #[must_use]
    pub fn set_count(&self) -> u32 {
        self.bits.iter().filter(|&&b| b).count() as u32
    }

    fn clear(&mut self) {
        self.bits.iter_mut().for_each(|b| *b = false);
    }

    fn shift(&mut self, by_minutes: usize) {
        if by_minutes >= self.bits.len() {
            self.clear();
            return;
        }
        for i in (by_minutes..self.bits.len()).rev() {
            self.bits[i] = self.bits[i - by_minutes];
        }
        for bit in &mut self.bits[..by_minutes] {
            *bit = false;
        }
    }

    fn count_suffix(&self, minutes: usize) -> u32 {
        self.bits.iter().take(minutes).filter(|&&b| b).count() as u32
    }
}

/// Attempt to record a connection at `now_sec` against `profile`, enforcing
/// `max_per_window` (total connections within the window) and
/// `max_per_minute` (connections within the most recent minute).
///
/// Implements §4.5 `markAndValidate` for a single profile (total or
/// duplex); [`DeviceIdentity::mark_and_validate`] calls this once or twice
/// depending on transport.
#[must_use]
pub fn mark_and_validate(
    profile: &mut ConnectionProfile,
    max_per_window: u32,
    max_per_minute: u32,
    now_sec: u32,
) -> bool {
    let delta_minutes = now_sec.saturating_sub(profile.last_connect_sec) / 60;
    profile.shift(delta_minutes as usize);

    if profile.set_count() >= max_per_window {
        return false;
    }
    if profile.count_suffix(1) >= max_per_minute {
        return false;
    }

    profile.bits[0] = true;
    profile.last_connect_sec = now_sec;
    true
}

/// A resolved device's identity and rate-limit state.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    /// Owning account id.
    pub account_id: String,
    /// Device id, unique within `account_id`.
    pub device_id: String,
    /// 48-bit globally unique device id, when the device identifies by it
    /// instead of (account, device).
    pub unique_id: u64,
    /// Whether the device is permitted to connect at all.
    pub is_active: bool,
    /// Encodings this device is currently permitted to use.
    pub supported_encodings: SupportedEncodings,
    /// Rate-limit window width, in minutes (1..=255).
    pub limit_time_interval_minutes: u8,
    /// Maximum events allowed within the rate-limit window; 0 disables the
    /// quota.
    pub max_allowed_events: u32,
    /// Connection history and quota for any transport.
    pub total_profile: ConnectionProfile,
    /// Maximum total connections within the window.
    pub total_max_conn: u32,
    /// Maximum total connections within the most recent minute.
    pub total_max_conn_per_minute: u32,
    /// Connection history and quota for duplex (TCP) transport only.
    pub duplex_profile: ConnectionProfile,
    /// Maximum duplex connections within the window.
    pub duplex_max_conn: u32,
    /// Maximum duplex connections within the most recent minute.
    pub duplex_max_conn_per_minute: u32,
}

impl DeviceIdentity {
    /// Validate and record a new connection attempt, per §4.5: the total
    /// profile is always consulted; the duplex profile is additionally
    /// consulted when `is_duplex` is set. Both must allow the connection.
    #[must_use]
    pub fn mark_and_validate(&mut self, is_duplex: bool, now_sec: u32) -> bool {
        let total_ok = mark_and_validate(
            &mut self.total_profile,
            self.total_max_conn,
            self.total_max_conn_per_minute,
            now_sec,
        );
        if !total_ok {
            return false;
        }
        if is_duplex {
            let duplex_ok = mark_and_validate(
                &mut self.duplex_profile,
                self.duplex_max_conn,
                self.duplex_max_conn_per_minute,
                now_sec,
            );
            if !duplex_ok {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_population_never_exceeds_window() {
        let mut profile = ConnectionProfile::new(5);
        let mut now = 0u32;
        let mut accepted = 0;
        for _ in 0..20 {
            if mark_and_validate(&mut profile, 3, 10, now) {
                accepted += 1;
            }
            now += 60;
        }
        assert!(profile.set_count() <= 3);
        assert!(accepted > 0);
    }

    #[test]
    fn test_per_minute_limit_denies_burst() {
        let mut profile = ConnectionProfile::new(5);
        assert!(mark_and_validate(&mut profile, 10, 1, 0));
        assert!(!mark_and_validate(&mut profile, 10, 1, 10));
    }

    #[test]
    fn test_window_elapsed_resets_mask() {
        let mut profile = ConnectionProfile::new(3);
        assert!(mark_and_validate(&mut profile, 1, 5, 0));
        assert!(!mark_and_validate(&mut profile, 1, 5, 60));
        assert!(mark_and_validate(&mut profile, 1, 5, 600));
    }

    #[test]
    fn test_device_identity_requires_both_profiles_for_duplex() {
        let mut identity = DeviceIdentity {
            account_id: "demo".into(),
            device_id: "m1".into(),
            unique_id: 0,
            is_active: true,
            supported_encodings: SupportedEncodings::BINARY,
            limit_time_interval_minutes: 5,
            max_allowed_events: 0,
            total_profile: ConnectionProfile::new(5),
            total_max_conn: 10,
            total_max_conn_per_minute: 10,
            duplex_profile: ConnectionProfile::new(5),
            duplex_max_conn: 1,
            duplex_max_conn_per_minute: 1,
        };
        assert!(identity.mark_and_validate(true, 0));
        assert!(!identity.mark_and_validate(true, 30));
    }
}
