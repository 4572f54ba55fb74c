use std::str::FromStr;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerId {
    Composer,
    Npm,
}

impl ManagerId {
    pub const ALL: [ManagerId; 2] = [ManagerId::Composer, ManagerId::Npm];

    /// Stable identifier used in reports and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagerId::Composer => "composer",
            ManagerId::Npm => "npm",
        }
    }

    pub fn descriptor(&self) -> &'static ManagerDescriptor {
        match self {
            ManagerId::Composer => &COMPOSER_DESCRIPTOR,
            ManagerId::Npm => &NPM_DESCRIPTOR,
        }
    }
}

impl FromStr for ManagerId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "composer" => Ok(ManagerId::Composer),
            "npm" => Ok(ManagerId::Npm),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ManagerAction {
    FindRequired,
    FindInstalled,
    FindUpdatable,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManagerDescriptor {
    pub id: ManagerId,
    pub manifest_file: &'static str,
    pub lock_file: &'static str,
}

const COMPOSER_DESCRIPTOR: ManagerDescriptor = ManagerDescriptor {
    id: ManagerId::Composer,
    manifest_file: "composer.json",
    lock_file: "composer.lock",
};

const NPM_DESCRIPTOR: ManagerDescriptor = ManagerDescriptor {
    id: ManagerId::Npm,
    manifest_file: "package.json",
    lock_file: "package-lock.json",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_round_trip_through_from_str() {
        for id in ManagerId::ALL {
            assert_eq!(id.as_str().parse::<ManagerId>(), Ok(id));
            assert_eq!(id.descriptor().id, id);
        }
        assert!("pip".parse::<ManagerId>().is_err());
    }
}
