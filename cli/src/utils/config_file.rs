use anyhow::{anyhow, Context, Result};
use rbac_authz::{AuthzConfig, DecisionEngine, IdentityProvider, Principal, StaticIdentityProvider};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File names searched for when no explicit config path is given
const CONFIG_FILE_NAMES: [&str; 3] = ["rbac.yaml", "rbac.yml", "config/rbac.yaml"];

/// Resolve the configuration path: an explicit path wins, otherwise search
/// upward from the current directory for a known config file name.
pub fn resolve(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(anyhow!("Configuration file not found: {}", path.display()));
    }

    let current_dir = env::current_dir()?;
    find_config_from(&current_dir).ok_or_else(|| {
        anyhow!(
            "No RBAC configuration found in {} or any parent directory.\n\
             Looked for: {}",
            current_dir.display(),
            CONFIG_FILE_NAMES.join(", ")
        )
    })
}

/// Walk from `start` towards the filesystem root looking for a config file
fn find_config_from(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}

/// Everything a command needs: the parsed config, an engine and the known principals.
pub struct Loaded {
    pub config: AuthzConfig,
    pub engine: DecisionEngine,
    pub identities: StaticIdentityProvider,
}

impl Loaded {
    /// Look up a principal by id; "anonymous" is the unauthenticated caller.
    pub fn principal(&self, id: &str) -> Result<Principal> {
        if id == "anonymous" {
            return Ok(Principal::anonymous());
        }
        self.identities.principal(id).ok_or_else(|| {
            anyhow!(
                "Unknown principal '{}'. Known principals: {}",
                id,
                self.identities.ids().join(", ")
            )
        })
    }
}

pub fn load(path: &Path) -> Result<Loaded> {
    let config = AuthzConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    let engine = DecisionEngine::from_config(&config)
        .with_context(|| format!("Invalid role/permission catalog in {}", path.display()))?;
    let identities = StaticIdentityProvider::new(config.principals.clone());
    debug!(
        "Loaded {} roles, {} permissions and {} principals from {}",
        config.roles.len(),
        config.permissions.len(),
        config.principals.len(),
        path.display()
    );

    Ok(Loaded {
        config,
        engine,
        identities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MINIMAL: &str = "roles: []\npermissions: []\n";

    #[test]
    fn test_resolve_explicit_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.yaml");
        fs::write(&path, MINIMAL).unwrap();

        assert_eq!(resolve(Some(&path)).unwrap(), path);
        assert!(resolve(Some(&temp_dir.path().join("missing.yaml"))).is_err());
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("rbac.yaml"), MINIMAL).unwrap();
        let nested = root.join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config_from(&nested), Some(root.join("rbac.yaml")));
    }

    #[test]
    fn test_find_config_in_config_dir() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("config")).unwrap();
        fs::write(root.join("config").join("rbac.yaml"), MINIMAL).unwrap();

        assert_eq!(
            find_config_from(root),
            Some(root.join("config").join("rbac.yaml"))
        );
    }

    #[test]
    fn test_load_and_lookup_principal() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rbac.yaml");
        fs::write(
            &path,
            r#"
roles:
  - id: viewer
    name: Viewer
    level: 25
permissions:
  - id: content:view
    granting_roles: [viewer]
principals:
  - id: u1
    roles: [viewer]
"#,
        )
        .unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.config.roles.len(), 1);
        assert_eq!(loaded.principal("u1").unwrap().roles, vec!["viewer"]);
        assert!(!loaded.principal("anonymous").unwrap().is_authenticated());
        assert!(loaded.principal("ghost").is_err());
    }

    #[test]
    fn test_load_rejects_bad_catalog() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rbac.yaml");
        fs::write(
            &path,
            "roles: []\npermissions:\n  - id: content:view\n    granting_roles: [ghost]\n",
        )
        .unwrap();

        let err = load(&path).err().unwrap();
        assert!(format!("{:#}", err).contains("undefined role 'ghost'"));
    }
}
