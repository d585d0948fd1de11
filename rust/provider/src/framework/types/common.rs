//! Common types that do not belong (yet) to a more specific module
use std::str::FromStr;

use snafu::{OptionExt, ResultExt, Snafu};
use strum::{EnumDiscriminants, IntoStaticStr};

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("version {version:?} does not contain a major version"))]
    MissingMajorVersion { version: String },

    #[snafu(display("version component {component:?} of {version:?} is not a number"))]
    ParseVersionComponent {
        source: std::num::ParseIntError,
        version: String,
        component: String,
    },
}

/// A product version like `7.10.2` or `2.19.1-SNAPSHOT`
///
/// Missing minor and patch components default to 0. A pre-release suffix is accepted but not
/// retained.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Version {
            major,
            minor,
            patch,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let release = s
            .trim()
            .split(['-', '+'])
            .next()
            .filter(|release| !release.is_empty())
            .context(MissingMajorVersionSnafu { version: s })?;

        let mut components = release.split('.').map(|component| {
            component
                .parse::<u32>()
                .context(ParseVersionComponentSnafu {
                    version: s,
                    component,
                })
        });

        let major = components
            .next()
            .context(MissingMajorVersionSnafu { version: s })??;
        let minor = components.next().transpose()?.unwrap_or_default();
        let patch = components.next().transpose()?.unwrap_or_default();

        Ok(Version::new(major, minor, patch))
    }
}
