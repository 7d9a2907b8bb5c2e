//! Shell scripts that launch one partitioned job each

use crate::error::{ForgeError, Result};
use crate::generation::ModelVariant;
use crate::keys::{Category, Group};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// Partition ids generated for try-on scripts when none is given
pub const DEFAULT_VTON_PARTITIONS: u32 = 7;

const BINARY_NAME: &str = "vton-forge";

/// Which job the scripts launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptDriver {
    /// One script per category and group, partition passed as `$1`
    Edit,
    /// One script per category, group and partition id
    Vton,
}

impl ScriptDriver {
    pub fn as_str(self) -> &'static str {
        match self {
            ScriptDriver::Edit => "edit",
            ScriptDriver::Vton => "vton",
        }
    }
}

impl fmt::Display for ScriptDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScriptDriver {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "edit" => Ok(ScriptDriver::Edit),
            "vton" => Ok(ScriptDriver::Vton),
            other => Err(ForgeError::invalid_config(format!(
                "unknown script driver '{other}' (expected edit or vton)"
            ))),
        }
    }
}

fn edit_script(category: Category, group: Group, model: ModelVariant) -> String {
    format!(
        r#"#!/bin/bash
# Edit job for {category} {group}, one partition per invocation
# Usage: ./run_{category}_{group}.sh <partition_name>

if [ -z "$1" ]; then
  echo "Error: No partition supplied."
  echo "Usage: ./run_{category}_{group}.sh <partition_name>"
  exit 1
fi

PARTITION=$1

echo "Starting job for {category} {group} - $PARTITION"

{BINARY_NAME} edit --model {model} --category {category} --group {group} --partition "$PARTITION"
"#
    )
}

fn vton_script(category: Category, group: Group, partition: u32, model: ModelVariant) -> String {
    format!(
        "#!/bin/bash\n\
         # Try-on job for {category} {group} partition {partition}\n\
         \n\
         {BINARY_NAME} vton --model {model} --category {category} --group {group} --partition partition_{partition}\n"
    )
}

fn write_script(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

/// Write launch scripts under `out_dir/{category}/`.
///
/// Edit scripts are named `run_{category}_{group}.sh`; try-on scripts are
/// `run_vton_{category}_{group}_p{id}.sh` for ids `0..partitions`. Existing
/// files are overwritten. Returns the written paths in generation order.
///
/// # Errors
/// - A directory or file cannot be written
pub fn generate_scripts(
    driver: ScriptDriver,
    out_dir: &Path,
    partitions: u32,
    model: ModelVariant,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for category in Category::ALL {
        let target_dir = out_dir.join(category.as_str());
        std::fs::create_dir_all(&target_dir)?;

        for group in Group::ALL {
            match driver {
                ScriptDriver::Edit => {
                    let path = target_dir.join(format!("run_{category}_{group}.sh"));
                    write_script(&path, &edit_script(category, group, model))?;
                    written.push(path);
                },
                ScriptDriver::Vton => {
                    for partition in 0..partitions {
                        let path = target_dir.join(format!("run_vton_{category}_{group}_p{partition}.sh"));
                        write_script(&path, &vton_script(category, group, partition, model))?;
                        written.push(path);
                    }
                },
            }
        }
    }

    info!(driver = %driver, count = written.len(), dir = %out_dir.display(), "📜 Scripts generated");
    Ok(written)
}
