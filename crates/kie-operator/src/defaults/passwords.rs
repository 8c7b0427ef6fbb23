use rand::{Rng, TryRngCore, rngs::OsRng, seq::SliceRandom};
use zeroize::Zeroizing;

use crate::{constants::DEFAULT_PASSWORD, crd::CommonConfig};

pub const PASSWORD_LENGTH: usize = 8;

const DIGITS: &[u8] = b"0123456789";
const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generates an alphanumeric password starting with a digit, with the remaining characters
/// shuffled. Every buffer holding it is wiped on drop.
pub fn generate_password(length: usize) -> Zeroizing<String> {
    let mut rng = OsRng.unwrap_err();
    let mut bytes = Zeroizing::new(Vec::with_capacity(length));
    if length > 0 {
        bytes.push(DIGITS[rng.random_range(0..DIGITS.len())]);
    }
    for _ in 1..length {
        bytes.push(ALPHANUMERIC[rng.random_range(0..ALPHANUMERIC.len())]);
    }
    if let Some(rest) = bytes.get_mut(1..) {
        rest.shuffle(&mut rng);
    }

    let mut password = Zeroizing::new(String::with_capacity(length));
    password.extend(bytes.iter().copied().map(char::from));
    password
}

/// Moves the value out of `password`, leaving the wrapper empty. The returned string owns the
/// only copy.
pub fn take_password(password: &mut Zeroizing<String>) -> String {
    std::mem::take(&mut **password)
}

/// [`generate_password`] as a plain string, for values stored on the resource.
pub fn generate_string(length: usize) -> String {
    take_password(&mut generate_password(length))
}

/// Fills every empty password, preferring the value applied by a previous reconcile so
/// credentials stay stable. Trial environments use a well-known password.
pub fn set_passwords(common: &mut CommonConfig, applied: Option<&CommonConfig>, trial: bool) {
    let applied = applied.cloned().unwrap_or_default();
    let passwords = [
        (&mut common.key_store_password, applied.key_store_password),
        (&mut common.admin_password, applied.admin_password),
        (&mut common.db_password, applied.db_password),
        (&mut common.amq_password, applied.amq_password),
        (&mut common.amq_cluster_password, applied.amq_cluster_password),
    ];

    for (password, previous) in passwords {
        if !password.is_empty() {
            continue;
        }
        *password = if !previous.is_empty() {
            previous
        } else if trial {
            DEFAULT_PASSWORD.to_owned()
        } else {
            generate_string(PASSWORD_LENGTH)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passwords_start_with_a_digit() {
        for _ in 0..50 {
            let password = generate_password(PASSWORD_LENGTH);
            assert_eq!(password.len(), PASSWORD_LENGTH);
            assert!(password.starts_with(|c: char| c.is_ascii_digit()));
            assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        }
        assert!(generate_password(0).is_empty());
    }

    #[test]
    fn taking_a_password_moves_the_buffer() {
        let mut password = generate_password(PASSWORD_LENGTH);
        let buffer = password.as_ptr();

        let taken = take_password(&mut password);

        assert!(password.is_empty());
        assert_eq!(password.capacity(), 0);
        assert_eq!(taken.len(), PASSWORD_LENGTH);
        assert_eq!(taken.as_ptr(), buffer);
    }

    #[test]
    fn set_passwords_keeps_configured_and_applied_values() {
        let mut common = CommonConfig {
            admin_password: "configured".to_owned(),
            ..CommonConfig::default()
        };
        let applied = CommonConfig {
            admin_password: "old-admin".to_owned(),
            db_password: "old-db".to_owned(),
            ..CommonConfig::default()
        };

        set_passwords(&mut common, Some(&applied), false);

        assert_eq!(common.admin_password, "configured");
        assert_eq!(common.db_password, "old-db");
        assert_eq!(common.amq_password.len(), PASSWORD_LENGTH);
        assert_ne!(common.amq_password, common.amq_cluster_password);
        assert_eq!(common.key_store_password.len(), PASSWORD_LENGTH);
    }

    #[test]
    fn trial_environments_use_the_default_password() {
        let mut common = CommonConfig::default();

        set_passwords(&mut common, None, true);

        assert_eq!(common.admin_password, DEFAULT_PASSWORD);
        assert_eq!(common.amq_cluster_password, DEFAULT_PASSWORD);
    }
}
