//! Boot-environment variables, the slot/rollback resolver, and the two
//! [`BootEnvSource`] implementations used to reach them.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use reportify::{Report, ResultExt};

/// Which of the two parallel installations is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootSlot {
    A,
    B,
}

impl BootSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            BootSlot::A => "A",
            BootSlot::B => "B",
        }
    }

    /// Name of the squashfs image for this slot, e.g. `app_a.squashfs`.
    pub fn image_file_name(self) -> &'static str {
        match self {
            BootSlot::A => "app_a.squashfs",
            BootSlot::B => "app_b.squashfs",
        }
    }

    fn other(self) -> BootSlot {
        match self {
            BootSlot::A => BootSlot::B,
            BootSlot::B => BootSlot::A,
        }
    }
}

impl fmt::Display for BootSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reboot-state ordinal reported by the updater, 0..=12. Values 9 and 12 mark a
/// specific cross-slot inconsistency window during a combined firmware+application
/// update; see [`resolve_slot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebootState(pub u8);

impl RebootState {
    pub const ROLLBACK_APP_FW_REBOOT_PENDING: RebootState = RebootState(9);
    pub const INCOMPLETE_APP_FW_ROLLBACK: RebootState = RebootState(12);

    fn is_rollback_recorded(self) -> bool {
        self == Self::ROLLBACK_APP_FW_REBOOT_PENDING || self == Self::INCOMPLETE_APP_FW_ROLLBACK
    }
}

/// Errors raised while reading or validating a boot-environment variable.
#[derive(Debug, thiserror::Error)]
pub enum BootEnvError {
    #[error("boot-env variable `{name}` is missing")]
    Missing { name: &'static str },
    #[error("boot-env variable `{name}` has value `{got}`, which is not in the allowed set {allowed}")]
    NotAllowed {
        name: &'static str,
        got: String,
        allowed: String,
    },
    #[error("boot-env variable `{name}` has value `{got}`, which cannot be converted to the requested type")]
    NotConvertible { name: &'static str, got: String },
    #[error("unable to read boot-env configuration from {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type BootEnvResult<T> = Result<T, Report<BootEnvError>>;

/// A black-box key/value getter over the boot loader's persisted environment.
///
/// Mirrors `libuboot`'s/`fw_printenv`'s surface: callers look up a variable by name
/// and, depending on what they already know about its shape, either take the raw
/// string or constrain it to an allowed set up front.
pub trait BootEnvSource {
    /// Returns the raw value of `name`, with no constraint on its shape.
    fn get_raw(&self, name: &'static str) -> BootEnvResult<String>;

    /// Returns the value of `name`, requiring it to be one of `allowed`.
    fn get_string(&self, name: &'static str, allowed: &'static [&'static str]) -> BootEnvResult<String> {
        let value = self.get_raw(name)?;
        if allowed.contains(&value.as_str()) {
            Ok(value)
        } else {
            Err(Report::new(BootEnvError::NotAllowed {
                name,
                got: value,
                allowed: format!("{allowed:?}"),
            }))
        }
    }

    /// Returns the value of `name`, parsed as `u8` and required to be one of `allowed`.
    fn get_u8(&self, name: &'static str, allowed: &'static [u8]) -> BootEnvResult<u8> {
        let value = self.get_raw(name)?;
        let parsed: u8 = value
            .trim()
            .parse()
            .map_err(|_| Report::new(BootEnvError::NotConvertible { name, got: value.clone() }))?;
        if allowed.contains(&parsed) {
            Ok(parsed)
        } else {
            Err(Report::new(BootEnvError::NotAllowed {
                name,
                got: value,
                allowed: format!("{allowed:?}"),
            }))
        }
    }

    /// Returns the value of `name`, required to be exactly one character and that
    /// character required to be one of `allowed`.
    fn get_char(&self, name: &'static str, allowed: &'static [char]) -> BootEnvResult<char> {
        let value = self.get_raw(name)?;
        let mut chars = value.chars();
        let (Some(ch), None) = (chars.next(), chars.next()) else {
            return Err(Report::new(BootEnvError::NotConvertible { name, got: value }));
        };
        if allowed.contains(&ch) {
            Ok(ch)
        } else {
            Err(Report::new(BootEnvError::NotAllowed {
                name,
                got: value,
                allowed: format!("{allowed:?}"),
            }))
        }
    }
}

/// An in-memory [`BootEnvSource`], used by tests and by anything that already has
/// the variables to hand (e.g. a boot-env dump captured for diagnostics).
#[derive(Debug, Default, Clone)]
pub struct MapBootEnv {
    values: HashMap<&'static str, String>,
}

impl MapBootEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.values.insert(name, value.into());
        self
    }
}

impl BootEnvSource for MapBootEnv {
    fn get_raw(&self, name: &'static str) -> BootEnvResult<String> {
        self.values
            .get(name)
            .cloned()
            .ok_or(Report::new(BootEnvError::Missing { name }))
    }
}

/// A [`BootEnvSource`] backed by a `name=value` text dump, the shape produced by
/// `fw_printenv` and read by `libuboot`-based tooling.
#[derive(Debug, Clone)]
pub struct UBootEnv {
    values: HashMap<String, String>,
}

impl UBootEnv {
    /// Loads the environment from a `fw_printenv`-style dump file.
    pub fn load(path: impl AsRef<Path>) -> BootEnvResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| {
            Report::new(BootEnvError::Io {
                path: path.display().to_string(),
                source,
            })
        })?;
        Ok(Self::parse_str(&text))
    }

    /// Parses a `fw_printenv`-style `name=value` dump already in memory, e.g.
    /// the captured stdout of running the tool directly.
    pub fn parse_str(text: &str) -> Self {
        let mut values = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                values.insert(key.trim().to_owned(), value.trim().to_owned());
            }
        }
        UBootEnv { values }
    }
}

impl BootEnvSource for UBootEnv {
    fn get_raw(&self, name: &'static str) -> BootEnvResult<String> {
        self.values
            .get(name)
            .cloned()
            .ok_or(Report::new(BootEnvError::Missing { name }))
    }
}

const BOOT_ORDERS: &[&str] = &["A B", "B A"];
const RAUC_CMDS: &[&str] = &["rauc.slot=A", "rauc.slot=B"];
const LEFT_COUNTS: &[u8] = &[0, 1, 2, 3];
const REBOOT_STATES: &[u8] = &[
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12,
];

/// The outcome of [`resolve_slot`]: which application image to mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedImage(pub BootSlot);

/// Reads the seven boot-env variables the slot resolver depends on and decides
/// which application image should be mounted.
///
/// This is a pure function of its inputs (Testable Property 1): the same boot-env
/// contents always yield the same [`SelectedImage`].
pub fn resolve_slot(env: &dyn BootEnvSource) -> BootEnvResult<SelectedImage> {
    let application = env.get_char("application", &['A', 'B'])?;
    let boot_order = env.get_string("BOOT_ORDER", BOOT_ORDERS)?;
    let boot_order_old = env.get_string("BOOT_ORDER_OLD", BOOT_ORDERS)?;
    let rauc_cmd = env.get_string("rauc_cmd", RAUC_CMDS)?;
    let boot_a_left = env.get_u8("BOOT_A_LEFT", LEFT_COUNTS)?;
    let boot_b_left = env.get_u8("BOOT_B_LEFT", LEFT_COUNTS)?;
    let update_reboot_state = RebootState(env.get_u8("update_reboot_state", REBOOT_STATES)?);

    let application = if application == 'A' { BootSlot::A } else { BootSlot::B };

    let current_slot = rauc_cmd
        .rsplit('=')
        .next()
        .expect("rsplit always yields at least one item");
    let first_old = boot_order_old
        .split(' ')
        .next()
        .expect("split always yields at least one item");

    let failed_reboot = current_slot == first_old
        && (boot_a_left == 0 || boot_b_left == 0)
        && boot_order != boot_order_old;

    let selected = if !failed_reboot {
        application
    } else if update_reboot_state.is_rollback_recorded() {
        application
    } else {
        application.other()
    };

    Ok(SelectedImage(selected))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nominal() -> MapBootEnv {
        MapBootEnv::new()
            .set("application", "A")
            .set("BOOT_ORDER", "A B")
            .set("BOOT_ORDER_OLD", "A B")
            .set("rauc_cmd", "rauc.slot=A")
            .set("BOOT_A_LEFT", "3")
            .set("BOOT_B_LEFT", "3")
            .set("update_reboot_state", "0")
    }

    #[test]
    fn s1_nominal_emmc_boot_a() {
        let selected = resolve_slot(&nominal()).unwrap();
        assert_eq!(selected.0, BootSlot::A);
    }

    #[test]
    fn s2_rollback_in_progress_keeps_nominal() {
        let env = nominal()
            .set("BOOT_ORDER", "B A")
            .set("BOOT_A_LEFT", "0")
            .set("update_reboot_state", "9");
        let selected = resolve_slot(&env).unwrap();
        assert_eq!(selected.0, BootSlot::A);
    }

    #[test]
    fn s3_failed_reboot_without_rollback_state_flips() {
        let env = nominal().set("BOOT_ORDER", "B A").set("BOOT_A_LEFT", "0");
        let selected = resolve_slot(&env).unwrap();
        assert_eq!(selected.0, BootSlot::B);
    }

    #[test]
    fn rejects_value_outside_allowed_set() {
        let env = nominal().set("application", "C");
        let err = resolve_slot(&env).unwrap_err();
        assert!(matches!(err.error(), BootEnvError::NotAllowed { name: "application", .. }));
    }

    #[test]
    fn rejects_multi_character_application_value() {
        let env = nominal().set("application", "AB");
        let err = resolve_slot(&env).unwrap_err();
        assert!(matches!(err.error(), BootEnvError::NotConvertible { name: "application", .. }));
    }

    #[test]
    fn rejects_unknown_boot_order() {
        let env = nominal().set("BOOT_ORDER", "C D");
        let err = resolve_slot(&env).unwrap_err();
        assert!(matches!(err.error(), BootEnvError::NotAllowed { name: "BOOT_ORDER", .. }));
    }

    #[test]
    fn pure_function_same_input_same_output() {
        let env = nominal();
        assert_eq!(resolve_slot(&env).unwrap(), resolve_slot(&env).unwrap());
    }

    #[test]
    fn exhaustive_sweep_always_selects_a_or_b() {
        for application in ['A', 'B'] {
            for &boot_order in BOOT_ORDERS {
                for &boot_order_old in BOOT_ORDERS {
                    for &rauc_cmd in RAUC_CMDS {
                        for &boot_a_left in LEFT_COUNTS {
                            for &boot_b_left in LEFT_COUNTS {
                                for &state in REBOOT_STATES {
                                    let env = MapBootEnv::new()
                                        .set("application", application.to_string())
                                        .set("BOOT_ORDER", boot_order)
                                        .set("BOOT_ORDER_OLD", boot_order_old)
                                        .set("rauc_cmd", rauc_cmd)
                                        .set("BOOT_A_LEFT", boot_a_left.to_string())
                                        .set("BOOT_B_LEFT", boot_b_left.to_string())
                                        .set("update_reboot_state", state.to_string());
                                    let selected = resolve_slot(&env).unwrap();
                                    assert_eq!(selected, resolve_slot(&env).unwrap());
                                    let _ = selected.0.image_file_name();
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}
