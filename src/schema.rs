//! A schema: a named set of entities living under one directory.
//!
//! Grounded on
//! `examples/harborgrid-justin-rusty-db/src/catalog/mod.rs`'s
//! `Catalog::create_table`/`get_table`/`drop_table` CRUD pattern, layered
//! one level below the catalogue: a schema owns entity directories the same
//! way that catalogue owns table definitions.

use crate::column::StorageVariant;
use crate::config::Config;
use crate::entity::{ColumnDef, Entity};
use crate::error::{DbError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Schema {
    name: String,
    dir: PathBuf,
    config: Config,
    variant: StorageVariant,
    entities: RwLock<HashMap<String, Arc<Entity>>>,
}

impl Schema {
    pub fn create(root: &Path, name: &str, config: Config, variant: StorageVariant) -> Result<Arc<Self>> {
        let dir = root.join(format!("schema_{name}"));
        if dir.exists() {
            return Err(DbError::AlreadyExists(format!("schema {name}")));
        }
        fs::create_dir_all(&dir)?;
        Ok(Arc::new(Self {
            name: name.to_string(),
            dir,
            config,
            variant,
            entities: RwLock::new(HashMap::new()),
        }))
    }

    pub fn open(root: &Path, name: &str, config: Config, variant: StorageVariant) -> Result<Arc<Self>> {
        let dir = root.join(format!("schema_{name}"));
        if !dir.exists() {
            return Err(DbError::NotFound(format!("schema {name}")));
        }
        let schema = Arc::new(Self {
            name: name.to_string(),
            dir: dir.clone(),
            config,
            variant,
            entities: RwLock::new(HashMap::new()),
        });

        if let Ok(entries) = fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let file_name = entry.file_name();
                let file_name = file_name.to_string_lossy();
                if let Some(entity_name) = file_name.strip_prefix("entity_") {
                    let entity = Entity::open(&dir, entity_name, schema.config.clone(), schema.variant)?;
                    schema.entities.write().insert(entity_name.to_string(), entity);
                }
            }
        }
        Ok(schema)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn create_entity(&self, name: &str, columns: Vec<ColumnDef>) -> Result<Arc<Entity>> {
        if self.entities.read().contains_key(name) {
            return Err(DbError::AlreadyExists(format!("entity {name}")));
        }
        let entity = Entity::create(&self.dir, name, columns, self.config.clone(), self.variant)?;
        self.entities.write().insert(name.to_string(), Arc::clone(&entity));
        Ok(entity)
    }

    pub fn entity(&self, name: &str) -> Result<Arc<Entity>> {
        self.entities
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("entity {name}")))
    }

    pub fn drop_entity(&self, name: &str) -> Result<()> {
        let entity = self
            .entities
            .write()
            .remove(name)
            .ok_or_else(|| DbError::NotFound(format!("entity {name}")))?;
        entity.close()?;
        fs::remove_dir_all(self.dir.join(format!("entity_{name}")))?;
        Ok(())
    }

    pub fn entity_names(&self) -> Vec<String> {
        self.entities.read().keys().cloned().collect()
    }

    pub fn close(&self) -> Result<()> {
        for entity in self.entities.read().values() {
            entity.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;
    use tempfile::tempdir;

    #[test]
    fn create_and_reopen_entity_through_schema() {
        let dir = tempdir().unwrap();
        let schema = Schema::create(dir.path(), "public", Config::default(), StorageVariant::WriteAheadLogged).unwrap();
        schema
            .create_entity("people", vec![ColumnDef::new("id", ValueType::Int, false)])
            .unwrap();
        assert_eq!(schema.entity_names(), vec!["people".to_string()]);
        schema.close().unwrap();

        let reopened = Schema::open(dir.path(), "public", Config::default(), StorageVariant::WriteAheadLogged).unwrap();
        assert!(reopened.entity("people").is_ok());
    }

    #[test]
    fn drop_entity_removes_directory() {
        let dir = tempdir().unwrap();
        let schema = Schema::create(dir.path(), "public", Config::default(), StorageVariant::WriteAheadLogged).unwrap();
        schema
            .create_entity("people", vec![ColumnDef::new("id", ValueType::Int, false)])
            .unwrap();
        schema.drop_entity("people").unwrap();
        assert!(schema.entity("people").is_err());
        assert!(!dir.path().join("schema_public").join("entity_people").exists());
    }
}
