//! Anti-rollback version policy.

use crate::manifest::VerifiedManifest;
use crate::{OtaError, OtaResult};

/// Decide whether an update may proceed against the stored anti-rollback
/// version. Returns whether the fleet *requires* it.
///
/// A `min_required` above the running version forces the update through,
/// even at an equal version number; otherwise anything at or below the
/// stored version is rejected unless rollback was explicitly allowed.
pub fn check_version(current: u32, manifest: &VerifiedManifest) -> OtaResult<bool> {
    if let Some(min_required) = manifest.min_required {
        if current < min_required {
            return Ok(true);
        }
    }
    if !manifest.allow_rollback && manifest.version <= current {
        return Err(OtaError::VersionRejected {
            current,
            offered: manifest.version,
        });
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(version: u32, min_required: Option<u32>, allow_rollback: bool) -> VerifiedManifest {
        VerifiedManifest {
            url: "https://fw.verdant.garden/app.bin".into(),
            digest: [0u8; 32],
            version,
            min_required,
            allow_rollback,
        }
    }

    #[test]
    fn newer_version_accepted() {
        assert!(!check_version(3, &manifest(4, None, false)).unwrap());
    }

    #[test]
    fn equal_version_rejected() {
        assert!(matches!(
            check_version(4, &manifest(4, None, false)),
            Err(OtaError::VersionRejected {
                current: 4,
                offered: 4
            })
        ));
    }

    #[test]
    fn older_version_rejected() {
        assert!(matches!(
            check_version(5, &manifest(3, None, false)),
            Err(OtaError::VersionRejected { .. })
        ));
    }

    #[test]
    fn rollback_flag_allows_older() {
        assert!(!check_version(5, &manifest(3, None, true)).unwrap());
    }

    #[test]
    fn min_required_forces_equal_version() {
        // current < min_required: the update proceeds even at an equal
        // version number, and is flagged as required.
        assert!(check_version(3, &manifest(3, Some(4), false)).unwrap());
    }

    #[test]
    fn min_required_already_met_does_not_override() {
        assert!(matches!(
            check_version(4, &manifest(4, Some(3), false)),
            Err(OtaError::VersionRejected { .. })
        ));
    }

    #[test]
    fn fresh_device_accepts_first_image() {
        assert!(!check_version(0, &manifest(1, None, false)).unwrap());
    }
}
