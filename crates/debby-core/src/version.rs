//! Version comparison for update detection.
//!
//! Two modes exist. Tagged releases are compared as dotted numeric versions
//! ("1.2", "v1.2.3", "2.0.0-RC1"). Packages pinned to a development branch carry a
//! commit reference instead, and references have no ordering: a different
//! reference is the only signal that something newer exists.

use semver::Version;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum VersionError {
    #[error("'{0}' is not a dotted numeric version")]
    Unparseable(String),
    #[error("commit reference must not be empty")]
    EmptyReference,
    #[error("no installed version to compare against")]
    NotInstalled,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareMode {
    Semantic,
    Reference,
}

/// Parse a version string into a `semver::Version`.
///
/// Accepts an optional leading `v`, two or three numeric components and an
/// optional pre-release/build suffix. A missing patch component is zero.
pub fn parse_version(version: &str) -> Result<Version, VersionError> {
    let unparseable = || VersionError::Unparseable(version.to_string());

    let trimmed = version.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (numbers, suffix) = trimmed.split_at(split_at);

    let components = numbers
        .split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            part.parse::<u64>().ok()
        })
        .collect::<Option<Vec<u64>>>()
        .ok_or_else(unparseable)?;

    let (major, minor, patch) = match components.as_slice() {
        [major, minor] => (*major, *minor, 0),
        [major, minor, patch] => (*major, *minor, *patch),
        _ => return Err(unparseable()),
    };

    Version::parse(&format!("{major}.{minor}.{patch}{suffix}")).map_err(|_| unparseable())
}

/// Whether `candidate` is strictly newer than `installed`.
pub fn is_later(mode: CompareMode, installed: &str, candidate: &str) -> Result<bool, VersionError> {
    match mode {
        CompareMode::Semantic => is_later_semantic(installed, candidate),
        CompareMode::Reference => is_later_reference(installed, candidate),
    }
}

pub fn is_later_semantic(installed: &str, candidate: &str) -> Result<bool, VersionError> {
    let installed = parse_version(installed)?;
    let candidate = parse_version(candidate)?;
    Ok(candidate > installed)
}

pub fn is_later_reference(installed: &str, candidate: &str) -> Result<bool, VersionError> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return Err(VersionError::EmptyReference);
    }
    Ok(!candidate.eq_ignore_ascii_case(installed.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_and_three_component_versions() {
        assert_eq!(parse_version("1.2").unwrap(), Version::new(1, 2, 0));
        assert_eq!(parse_version("1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_version("v2.10.0").unwrap(), Version::new(2, 10, 0));
        assert_eq!(parse_version(" 3.0 ").unwrap(), Version::new(3, 0, 0));
    }

    #[test]
    fn keeps_pre_release_suffix() {
        let version = parse_version("2.0.0-RC1").unwrap();
        assert_eq!(version.major, 2);
        assert_eq!(version.pre.as_str(), "RC1");
    }

    #[test]
    fn rejects_malformed_versions() {
        for input in ["", "1", "1.2.3.4", "dev-main", "1.x", "v", "1..2", "abc"] {
            assert_eq!(
                parse_version(input),
                Err(VersionError::Unparseable(input.to_string())),
                "input: {input:?}"
            );
        }
    }

    #[test]
    fn semantic_comparison_is_strict_and_directional() {
        let pairs = [
            ("1.0.0", "1.2.0"),
            ("1.0", "1.0.1"),
            ("v1.9.9", "2.0"),
            ("1.2.9", "1.10.0"),
            ("2.0.0-RC1", "2.0.0"),
        ];
        for (older, newer) in pairs {
            assert!(is_later_semantic(older, newer).unwrap(), "{older} < {newer}");
            assert!(!is_later_semantic(newer, older).unwrap(), "{newer} > {older}");
        }
    }

    #[test]
    fn equal_versions_are_not_later_in_either_direction() {
        for (a, b) in [("1.2.0", "1.2.0"), ("1.2", "1.2.0"), ("v1.2.0", "1.2")] {
            assert!(!is_later_semantic(a, b).unwrap());
            assert!(!is_later_semantic(b, a).unwrap());
        }
    }

    #[test]
    fn semantic_comparison_surfaces_unparseable_input() {
        assert!(is_later_semantic("1.0.0", "latest").is_err());
        assert!(is_later_semantic("dev-main", "1.0.0").is_err());
    }

    #[test]
    fn reference_comparison_treats_any_other_hash_as_newer() {
        let installed = "abc1230000000000000000000000000000000000";
        let other = "def4560000000000000000000000000000000000";
        assert!(is_later(CompareMode::Reference, installed, other).unwrap());
        assert!(!is_later(CompareMode::Reference, installed, installed).unwrap());
        assert!(
            !is_later(CompareMode::Reference, installed, &installed.to_uppercase()).unwrap()
        );
    }

    #[test]
    fn reference_comparison_rejects_empty_candidate() {
        assert_eq!(
            is_later_reference("abc123", "  "),
            Err(VersionError::EmptyReference)
        );
    }
}
