// SPDX-License-Identifier: MIT

use crate::errors::{ConfigError, ConfigResult};
use crate::profile::DevProfile;
use crate::types::*;
use crate::{bail, ensure};

/// Handler subtype, the fixed prefix of every configuration string.
pub const HANDLER_SUBTYPE: &str = "dhsmr";

/// Default configuration values.
pub const CONF_DEFAULT_DEV_TYPE: DeviceType = DeviceType::ZoneDomains;
pub const CONF_DEFAULT_DEV_MODEL: u32 = MO_ZD_SOBR_NO_CMR;
pub const CONF_DEFAULT_ZSIZE: u64 = 256 * 1024 * 1024;
pub const CONF_DEFAULT_LBA_SIZE: u32 = 512;
pub const CONF_DEFAULT_OPEN_NUM: u32 = 128;
pub const CONF_DEFAULT_REALM_SIZE: u64 = CONF_DEFAULT_ZSIZE * 10;
pub const CONF_DEFAULT_SMR_GAIN: u32 = 125;
pub const CONF_DEFAULT_MAX_ACTIVATE: u32 = 0; // Unlimited

/// Emulated device configuration.
///
/// Values come from parsing the configuration string, except for the
/// desired capacity, which the host runtime supplies at open time.
#[derive(Debug, Clone)]
pub struct DevConfig {
    /// Backing file path.
    pub path: String,

    /// Device personality.
    pub dev_type: DeviceType,
    pub dev_model: u32,
    pub profile: &'static DevProfile,

    /// Desired physical capacity in bytes.
    pub phys_capacity: u64,

    /// Sizes in bytes.
    pub lba_size: u32,
    pub zone_size: u64,
    pub realm_size: u64,

    /// `None` selects the 1%-of-capacity default.
    pub conv_num: Option<u32>,
    pub open_num: u32,
    pub smr_gain: u32,
    /// `None` selects the profile default; `Some(0)` is unlimited.
    pub max_activate: Option<u32>,
    /// `None` defers to the profile's initial setting.
    pub wp_check: Option<bool>,
    pub realms_feat_set: bool,

    /// The exact configuration string, cached in metadata to avoid
    /// reformatting an unchanged device.
    pub cfg_str: String,

    /// Saved copies of the dynamically changeable geometry parameters,
    /// used to revert after a failed mutation.
    pub zone_size_cfgstr: u64,
    pub realm_size_cfgstr: u64,
    pub smr_gain_cfgstr: u32,
}

impl DevConfig {
    /// Parse a `dhsmr/[opt[/opt]...][@]<path>` configuration string.
    pub fn parse(cfgstring: &str) -> ConfigResult<DevConfig> {
        let profile = DevProfile::find(CONF_DEFAULT_DEV_TYPE, CONF_DEFAULT_DEV_MODEL)
            .expect("default profile present");
        let mut cfg = DevConfig {
            path: String::new(),
            dev_type: CONF_DEFAULT_DEV_TYPE,
            dev_model: CONF_DEFAULT_DEV_MODEL,
            profile,
            phys_capacity: 0,
            lba_size: CONF_DEFAULT_LBA_SIZE,
            zone_size: CONF_DEFAULT_ZSIZE,
            realm_size: CONF_DEFAULT_REALM_SIZE,
            conv_num: None,
            open_num: CONF_DEFAULT_OPEN_NUM,
            smr_gain: CONF_DEFAULT_SMR_GAIN,
            max_activate: None,
            wp_check: None,
            realms_feat_set: true,
            cfg_str: cfgstring.to_string(),
            zone_size_cfgstr: 0,
            realm_size_cfgstr: 0,
            smr_gain_cfgstr: 0,
        };

        let mut rest = cfgstring
            .strip_prefix(HANDLER_SUBTYPE)
            .and_then(|s| s.strip_prefix('/'))
            .ok_or(ConfigError::Invalid("Invalid configuration string format"))?;

        if !rest.starts_with('/') {
            // Parse option parameters up to the '@' path separator.
            loop {
                if rest.is_empty() || rest.starts_with('@') {
                    break;
                }
                rest = parse_one_option(rest, &mut cfg)?;
                match rest.as_bytes().first() {
                    Some(b'/') => rest = &rest[1..],
                    _ => break,
                }
            }

            rest = rest
                .strip_prefix('@')
                .ok_or(ConfigError::Invalid("Invalid configuration string format"))?;
        }

        ensure!(!rest.is_empty(), ConfigError::Invalid("Missing backing file path"));
        cfg.path = rest.to_string();

        // Save originals for reversion if dynamic changes cause problems.
        cfg.zone_size_cfgstr = cfg.zone_size;
        cfg.realm_size_cfgstr = cfg.realm_size;
        cfg.smr_gain_cfgstr = cfg.smr_gain;

        Ok(cfg)
    }

    /// The WP-check setting to format with: the config string overrides
    /// the profile's initial value.
    pub fn effective_wp_check(&self) -> bool {
        self.wp_check.unwrap_or(self.profile.initial_wp_check)
    }

    /// The MAXIMUM ACTIVATION value to format with.
    pub fn effective_max_activate(&self, profile: &DevProfile) -> u32 {
        self.max_activate.unwrap_or(profile.max_activate)
    }
}

fn parse_one_option<'a>(s: &'a str, cfg: &mut DevConfig) -> ConfigResult<&'a str> {
    if let Some(val) = s.strip_prefix("type-") {
        return parse_dev_type(val, cfg);
    }
    if let Some(val) = s.strip_prefix("model-") {
        return parse_model(val, cfg);
    }
    if let Some(val) = s.strip_prefix("lba-") {
        let (n, rest) = split_num(val);
        ensure!(n == 512 || n == 4096, ConfigError::Invalid("Invalid LBA size"));
        cfg.lba_size = n as u32;
        return Ok(rest);
    }
    if let Some(val) = s.strip_prefix("zsize-") {
        let (size, rest) = parse_kib_or_mib(val)?;
        ensure!(
            size != 0 && size & (size - 1) == 0,
            ConfigError::Invalid("Invalid zone size")
        );
        cfg.zone_size = size;
        return Ok(rest);
    }
    if let Some(val) = s.strip_prefix("conv-") {
        let (n, rest) = split_num(val);
        cfg.conv_num = Some(n as u32);
        return Ok(rest);
    }
    if let Some(val) = s.strip_prefix("open-") {
        let (n, rest) = split_num(val);
        ensure!(n != 0, ConfigError::Invalid("Invalid number of open zones"));
        cfg.open_num = n as u32;
        return Ok(rest);
    }
    if let Some(val) = s.strip_prefix("rsize-") {
        let (size, rest) = parse_kib_or_mib(val)?;
        ensure!(size != 0, ConfigError::Invalid("Invalid zone realm size"));
        cfg.realm_size = size;
        return Ok(rest);
    }
    if let Some(val) = s.strip_prefix("sgain-") {
        return parse_smr_gain(val, cfg);
    }
    if let Some(val) = s.strip_prefix("maxact-") {
        let (n, rest) = split_num(val);
        cfg.max_activate = Some(n as u32);
        return Ok(rest);
    }
    if let Some(val) = s.strip_prefix("wpcheck-") {
        let (v, rest) = parse_yn(val, "Invalid WP check switch, value should be 'y' or 'n'")?;
        cfg.wp_check = Some(v);
        return Ok(rest);
    }
    if let Some(val) = s.strip_prefix("realms-") {
        let (v, rest) = parse_yn(val, "Invalid Realms support switch, value should be 'y' or 'n'")?;
        cfg.realms_feat_set = v;
        return Ok(rest);
    }

    bail!(ConfigError::Invalid("Invalid option name"))
}

fn parse_dev_type<'a>(val: &'a str, cfg: &mut DevConfig) -> ConfigResult<&'a str> {
    for f in crate::profile::PROFILES {
        if let Some(rest) = val.strip_prefix(f.name) {
            // The name must be followed by a separator so ZD_SOBR does
            // not swallow ZD_SOBR_SWP.
            if matches!(rest.as_bytes().first(), Some(b'/') | Some(b'@')) {
                cfg.dev_type = f.dev_type;
                cfg.dev_model = f.model;
                cfg.profile = f;
                return Ok(rest);
            }
        }
    }

    bail!(ConfigError::Invalid("Unsupported device type"))
}

/// Kept for compatibility only: the original shorthand for an SMR device
/// with 1% CMR zones at the bottom.
fn parse_model<'a>(val: &'a str, cfg: &mut DevConfig) -> ConfigResult<&'a str> {
    if let Some(rest) = val.strip_prefix("HA") {
        cfg.dev_type = DeviceType::HaZoned;
        cfg.dev_model = MO_SMR_1PCNT_B;
        cfg.profile = DevProfile::find(cfg.dev_type, cfg.dev_model).expect("HA profile");
        return Ok(rest);
    }
    if let Some(rest) = val.strip_prefix("HM") {
        cfg.dev_type = DeviceType::HmZoned;
        cfg.dev_model = MO_SMR_1PCNT_B;
        cfg.profile = DevProfile::find(cfg.dev_type, cfg.dev_model).expect("HM profile");
        return Ok(rest);
    }

    bail!(ConfigError::Invalid("Invalid device model"))
}

fn parse_smr_gain<'a>(val: &'a str, cfg: &mut DevConfig) -> ConfigResult<&'a str> {
    let end = val
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(val.len());
    let gain = val[..end]
        .parse::<f64>()
        .map_err(|_| ConfigError::Invalid("Invalid zone realm SMR gain"))?;
    let gain = (gain * 100.0) as u32;
    ensure!(gain > 100, ConfigError::Invalid("Invalid zone realm SMR gain"));
    cfg.smr_gain = gain;
    Ok(&val[end..])
}

/// `<N>` means N MiB; `<N>K` means N KiB.
fn parse_kib_or_mib(val: &str) -> ConfigResult<(u64, &str)> {
    let (n, rest) = split_num(val);
    let mut size = n * 1024;
    let rest = match rest.strip_prefix('K') {
        Some(r) => r,
        None => {
            size *= 1024;
            rest
        }
    };
    Ok((size, rest))
}

fn parse_yn<'a>(val: &'a str, err: &'static str) -> ConfigResult<(bool, &'a str)> {
    match val.as_bytes().first() {
        Some(b'y') => Ok((true, &val[1..])),
        Some(b'n') => Ok((false, &val[1..])),
        _ => Err(ConfigError::Invalid(err)),
    }
}

fn split_num(s: &str) -> (u64, &str) {
    let end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let n = s[..end].parse::<u64>().unwrap_or(0);
    (n, &s[end..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_path() {
        let cfg = DevConfig::parse("dhsmr//var/local/hzbc.raw").unwrap();
        assert_eq!(cfg.path, "/var/local/hzbc.raw");
        assert_eq!(cfg.dev_type, DeviceType::ZoneDomains);
        assert_eq!(cfg.dev_model, MO_ZD_SOBR_NO_CMR);
        assert_eq!(cfg.lba_size, 512);
        assert_eq!(cfg.zone_size, 256 * 1024 * 1024);
        assert_eq!(cfg.realm_size, 10 * 256 * 1024 * 1024);
        assert_eq!(cfg.smr_gain, 125);
        assert!(cfg.realms_feat_set);
        assert!(cfg.wp_check.is_none());
    }

    #[test]
    fn test_full_option_string() {
        let cfg = DevConfig::parse(
            "dhsmr/type-ZD_1CMR_BOT/lba-4096/zsize-64/open-8/rsize-256/sgain-1.5/maxact-16/wpcheck-y/realms-n@/tmp/z.raw",
        )
        .unwrap();
        assert_eq!(cfg.profile.name, "ZD_1CMR_BOT");
        assert_eq!(cfg.lba_size, 4096);
        assert_eq!(cfg.zone_size, 64 * 1024 * 1024);
        assert_eq!(cfg.open_num, 8);
        assert_eq!(cfg.realm_size, 256 * 1024 * 1024);
        assert_eq!(cfg.smr_gain, 150);
        assert_eq!(cfg.max_activate, Some(16));
        assert_eq!(cfg.wp_check, Some(true));
        assert!(!cfg.realms_feat_set);
        assert_eq!(cfg.path, "/tmp/z.raw");
    }

    #[test]
    fn test_k_suffix_sizes() {
        let cfg = DevConfig::parse("dhsmr/zsize-64K/rsize-256K@/tmp/z.raw").unwrap();
        assert_eq!(cfg.zone_size, 64 * 1024);
        assert_eq!(cfg.realm_size, 256 * 1024);
    }

    #[test]
    fn test_profile_name_is_not_a_prefix_match() {
        let cfg = DevConfig::parse("dhsmr/type-ZD_SOBR_SWP@/tmp/z.raw").unwrap();
        assert_eq!(cfg.profile.name, "ZD_SOBR_SWP");
        let cfg = DevConfig::parse("dhsmr/type-ZD_SOBR@/tmp/z.raw").unwrap();
        assert_eq!(cfg.profile.name, "ZD_SOBR");
    }

    #[test]
    fn test_model_compat_shortcut() {
        let cfg = DevConfig::parse("dhsmr/model-HA@/tmp/z.raw").unwrap();
        assert_eq!(cfg.dev_type, DeviceType::HaZoned);
        assert_eq!(cfg.dev_model, MO_SMR_1PCNT_B);
    }

    #[test]
    fn test_rejects() {
        assert!(DevConfig::parse("file//tmp/z.raw").is_err());
        assert!(DevConfig::parse("dhsmr/lba-1024@/tmp/z.raw").is_err());
        assert!(DevConfig::parse("dhsmr/zsize-96@/tmp/z.raw").is_err()); // not a power of two
        assert!(DevConfig::parse("dhsmr/open-0@/tmp/z.raw").is_err());
        assert!(DevConfig::parse("dhsmr/sgain-0.5@/tmp/z.raw").is_err());
        assert!(DevConfig::parse("dhsmr/wpcheck-x@/tmp/z.raw").is_err());
        assert!(DevConfig::parse("dhsmr/bogus-1@/tmp/z.raw").is_err());
    }
}
