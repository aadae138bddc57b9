mod raw;

use crate::materials::{Catalog, Material, Unit};
use crate::session::Role;
use anyhow::{Context, Error, Result, bail};
use async_std::fs;
use rust_decimal::prelude::*;
use std::convert::{TryFrom, TryInto};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_CONFIG_FILE: &str = "thuchi.yaml";

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub name: String,
    pub role: Role,
    pub password_hash: String,
}

/// Where things live and who may change them.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub ledger: PathBuf,
    pub materials: PathBuf,
    pub receipts: PathBuf,
    pub session: PathBuf,
    pub catalog: Catalog,
    pub users: Vec<User>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ledger: PathBuf::from("thuchi.psv"),
            materials: PathBuf::from("materials.psv"),
            receipts: PathBuf::from("receipts"),
            session: PathBuf::from(".thuchi-session.json"),
            catalog: Catalog::default(),
            users: Vec::new(),
        }
    }
}

impl Config {
    /// Reads `file`, falling back to defaults when it does not exist.
    ///
    /// Relative paths in the file are taken relative to the file's directory.
    pub async fn from_file(file: &Path) -> Result<Self> {
        let doc = match fs::read_to_string(file).await {
            Ok(doc) => doc,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", file.display());
                return Ok(Config::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read {}", file.display()));
            }
        };
        let config: Config = doc.parse()?;
        let base = file.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.relative_to(base))
    }

    fn relative_to(self, base: &Path) -> Self {
        let resolve = |path: PathBuf| {
            if path.is_absolute() {
                path
            } else {
                base.join(path)
            }
        };
        Config {
            ledger: resolve(self.ledger),
            materials: resolve(self.materials),
            receipts: resolve(self.receipts),
            session: resolve(self.session),
            ..self
        }
    }

    /// Auth is off when no users are configured.
    pub fn auth_enabled(&self) -> bool {
        !self.users.is_empty()
    }

    pub fn user(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|user| user.name == name)
    }
}

impl TryFrom<raw::Material> for Material {
    type Error = Error;

    fn try_from(raw: raw::Material) -> Result<Self> {
        let units = raw
            .units
            .unwrap_or_default()
            .into_iter()
            .map(|(name, per_base)| {
                let per_base = Decimal::from_f64(per_base)
                    .filter(|d| *d > Decimal::ZERO)
                    .with_context(|| {
                        format!("Unit '{}' of {} needs a positive factor", name, raw.code)
                    })?;
                Ok(Unit { name, per_base })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Material {
            name: raw.name.unwrap_or_else(|| raw.code.clone()),
            code: raw.code,
            base_unit: raw.base_unit,
            units,
        })
    }
}

impl TryFrom<raw::User> for User {
    type Error = Error;

    fn try_from(raw: raw::User) -> Result<Self> {
        if raw.password_hash.is_empty() {
            bail!("User {} has no password hash", raw.name);
        }
        Ok(User {
            role: raw
                .role
                .parse()
                .with_context(|| format!("Invalid role for user {}", raw.name))?,
            name: raw.name,
            password_hash: raw.password_hash,
        })
    }
}

impl TryFrom<raw::Config> for Config {
    type Error = Error;

    fn try_from(raw: raw::Config) -> Result<Self> {
        let defaults = Config::default();
        Ok(Config {
            ledger: raw.ledger.map_or(defaults.ledger, PathBuf::from),
            materials: raw.materials.map_or(defaults.materials, PathBuf::from),
            receipts: raw.receipts.map_or(defaults.receipts, PathBuf::from),
            session: raw.session.map_or(defaults.session, PathBuf::from),
            catalog: Catalog(
                raw.catalog
                    .unwrap_or_default()
                    .into_iter()
                    .map(TryInto::try_into)
                    .collect::<Result<Vec<Material>>>()?,
            ),
            users: raw
                .users
                .unwrap_or_default()
                .into_iter()
                .map(TryInto::try_into)
                .collect::<Result<Vec<User>>>()?,
        })
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(doc: &str) -> Result<Self, Self::Err> {
        let raw_config: raw::Config = serde_yaml::from_str(doc)
            .with_context(|| format!("Failed to deserialize Config:\n{}", doc))?;
        let config: Config = raw_config
            .try_into()
            .context("Failed to convert Config")?;
        Ok(config)
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn parse_full_config() -> Result<()> {
        let config: Config = indoc! {r#"
            ledger: data/thuchi.psv
            receipts: /srv/receipts
            catalog:
              - code: XM
                name: Xi măng
                base_unit: bao
                units:
                  tan: 20
              - code: CAT
                base_unit: m3
            users:
              - name: chu
                role: admin
                password_hash: "$2b$04$abcdefghijklmnopqrstuv"
              - name: ketoan
                role: Viewer
                password_hash: "$2b$04$abcdefghijklmnopqrstuv"
        "#}
        .parse()?;

        assert_eq!(config.ledger, PathBuf::from("data/thuchi.psv"));
        assert_eq!(config.materials, PathBuf::from("materials.psv"));
        assert_eq!(config.catalog.get("XM")?.factor("tan")?, Decimal::from(20));
        assert_eq!(config.catalog.get("CAT")?.name, "CAT");
        assert_eq!(config.users.len(), 2);
        assert_eq!(config.user("ketoan").map(|u| u.role), Some(Role::Viewer));
        assert!(config.auth_enabled());

        let config = config.relative_to(Path::new("/home/a"));
        assert_eq!(config.ledger, PathBuf::from("/home/a/data/thuchi.psv"));
        assert_eq!(config.receipts, PathBuf::from("/srv/receipts"));
        Ok(())
    }

    #[test]
    fn parse_errors() {
        let err = "users:\n  - name: x\n    role: boss\n    password_hash: h\n"
            .parse::<Config>()
            .unwrap_err();
        assert!(format!("{err:#}").contains("Invalid role for user x"));

        let err = "catalog:\n  - code: XM\n    base_unit: bao\n    units:\n      tan: 0\n"
            .parse::<Config>()
            .unwrap_err();
        assert!(format!("{err:#}").contains("positive factor"));
    }

    #[async_std::test]
    async fn missing_file_uses_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = Config::from_file(&dir.path().join(DEFAULT_CONFIG_FILE)).await?;
        assert_eq!(config, Config::default());
        assert!(!config.auth_enabled());
        Ok(())
    }
}
