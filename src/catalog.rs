//! The catalogue: the top-level registry of schemas for one data directory.
//!
//! Grounded on `examples/harborgrid-justin-rusty-db/src/catalog/mod.rs`'s
//! `Catalog` struct, a `RwLock<HashMap<String, Arc<Schema>>>` guarding CRUD
//! operations over named children, generalized one level up from tables to
//! schemas.

use crate::column::StorageVariant;
use crate::config::Config;
use crate::error::{DbError, Result};
use crate::schema::Schema;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Catalog {
    root: PathBuf,
    config: Config,
    variant: StorageVariant,
    schemas: RwLock<HashMap<String, Arc<Schema>>>,
}

impl Catalog {
    pub fn open(root: &Path, config: Config, variant: StorageVariant) -> Result<Arc<Self>> {
        fs::create_dir_all(root)?;
        let catalog = Arc::new(Self {
            root: root.to_path_buf(),
            config,
            variant,
            schemas: RwLock::new(HashMap::new()),
        });

        for entry in fs::read_dir(root)?.flatten() {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(schema_name) = file_name.strip_prefix("schema_") {
                let schema = Schema::open(root, schema_name, catalog.config.clone(), catalog.variant)?;
                catalog.schemas.write().insert(schema_name.to_string(), schema);
            }
        }
        Ok(catalog)
    }

    pub fn create_schema(&self, name: &str) -> Result<Arc<Schema>> {
        if self.schemas.read().contains_key(name) {
            return Err(DbError::AlreadyExists(format!("schema {name}")));
        }
        let schema = Schema::create(&self.root, name, self.config.clone(), self.variant)?;
        self.schemas.write().insert(name.to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    pub fn schema(&self, name: &str) -> Result<Arc<Schema>> {
        self.schemas
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("schema {name}")))
    }

    pub fn drop_schema(&self, name: &str) -> Result<()> {
        let schema = self
            .schemas
            .write()
            .remove(name)
            .ok_or_else(|| DbError::NotFound(format!("schema {name}")))?;
        schema.close()?;
        fs::remove_dir_all(self.root.join(format!("schema_{name}")))?;
        Ok(())
    }

    pub fn schema_names(&self) -> Vec<String> {
        self.schemas.read().keys().cloned().collect()
    }

    pub fn close(&self) -> Result<()> {
        for schema in self.schemas.read().values() {
            schema.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_schema_and_reopen_catalog() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::open(dir.path(), Config::default(), StorageVariant::WriteAheadLogged).unwrap();
        catalog.create_schema("public").unwrap();
        assert_eq!(catalog.schema_names(), vec!["public".to_string()]);
        catalog.close().unwrap();

        let reopened = Catalog::open(dir.path(), Config::default(), StorageVariant::WriteAheadLogged).unwrap();
        assert!(reopened.schema("public").is_ok());
    }

    #[test]
    fn drop_schema_removes_directory_and_is_idempotent_error() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::open(dir.path(), Config::default(), StorageVariant::WriteAheadLogged).unwrap();
        catalog.create_schema("public").unwrap();
        catalog.drop_schema("public").unwrap();
        assert!(catalog.schema("public").is_err());
        assert!(catalog.drop_schema("public").is_err());
    }
}
