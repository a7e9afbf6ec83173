use anyhow::{bail, Context, Result};
use regex::Regex;

use super::Vars;
use crate::config::Config;

/// Parse an import id against an ordered list of id regexes with named groups
///
/// The first matching regex wins. `project`, `region` and `zone` are taken from the
/// provider configuration when the most complete format (the first one) has them
/// but the id does not.
pub fn parse_import_id(id: &str, formats: &[&str], config: &Config) -> Result<Vars> {
    for format in formats {
        let re = Regex::new(format).with_context(|| format!("invalid import format {format:?}"))?;
        let Some(captures) = re.captures(id) else {
            continue;
        };

        let mut vars = Vars::new();
        for name in re.capture_names().flatten() {
            if let Some(value) = captures.name(name) {
                vars.insert(name, value.as_str());
            }
        }

        if let Some(first) = formats.first() {
            for (field, default) in [
                ("project", &config.project),
                ("region", &config.region),
                ("zone", &config.zone),
            ] {
                if first.contains(&format!("(?P<{field}>")) && vars.get(field).is_none() {
                    if let Some(default) = default {
                        vars.insert(field, default);
                    }
                }
            }
        }
        return Ok(vars);
    }
    bail!("Import id {id:?} doesn't match any of the accepted formats: {formats:?}")
}
