//! ActiveRecord-style models over the query builder.
//!
//! # Responsibilities
//! - Hold a row's attributes and guard mass assignment with a fillable policy
//! - Provide find / find_or_fail / all / create / save / delete / refresh
//! - Bind a model type to a database handle (`Repository`)
//!
//! # Design Decisions
//! - `save` inserts when the primary key is empty, otherwise updates
//! - Saving with no fillable data is a no-op, never an empty statement
//! - `fill` drops keys outside the whitelist without failing; they are logged at debug

use std::marker::PhantomData;

use serde_json::Value;

use crate::db::connection::{Database, Row};
use crate::db::error::DbError;
use crate::db::query::QueryBuilder;

/// Mass-assignment policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fillable {
    /// Every key may be mass-assigned.
    Permissive,
    /// Only the listed keys may be mass-assigned. An empty list behaves like
    /// [`Fillable::Permissive`].
    Whitelist(&'static [&'static str]),
}

impl Fillable {
    pub fn allows(&self, key: &str) -> bool {
        match self {
            Fillable::Permissive => true,
            Fillable::Whitelist(keys) => keys.is_empty() || keys.contains(&key),
        }
    }
}

/// A table-backed record.
///
/// Implementors supply storage for the attribute map; everything else is provided.
pub trait Model: Sized {
    const TABLE: &'static str;
    const PRIMARY_KEY: &'static str = "id";
    const FILLABLE: Fillable = Fillable::Permissive;

    fn from_attributes(attributes: Row) -> Self;

    fn attributes(&self) -> &Row;

    fn attributes_mut(&mut self) -> &mut Row;

    /// Short type name used in not-found errors.
    fn model_name() -> &'static str {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or(Self::TABLE)
    }

    /// New unsaved model, mass-assigned from `attributes`.
    fn make(attributes: Row) -> Self {
        let mut model = Self::from_attributes(Row::new());
        model.fill(attributes);
        model
    }

    /// Mass-assign `attributes`, keeping only keys the fillable policy allows.
    fn fill(&mut self, attributes: Row) -> &mut Self {
        let mut dropped = Vec::new();
        for (key, value) in attributes {
            if Self::FILLABLE.allows(&key) {
                self.attributes_mut().insert(key, value);
            } else {
                dropped.push(key);
            }
        }
        if !dropped.is_empty() {
            tracing::debug!(
                model = Self::model_name(),
                dropped = ?dropped,
                "Ignoring non-fillable attributes"
            );
        }
        self
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.attributes().get(key)
    }

    /// Set one attribute, bypassing the fillable policy.
    fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.attributes_mut().insert(key.to_string(), value.into());
        self
    }

    /// The primary key, when set and non-empty.
    fn id(&self) -> Option<&Value> {
        match self.get(Self::PRIMARY_KEY)? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            value => Some(value),
        }
    }

    fn query(db: &Database) -> QueryBuilder<'_> {
        db.table(Self::TABLE)
    }

    fn find(db: &Database, id: impl Into<Value>) -> Result<Option<Self>, DbError> {
        Ok(Self::query(db)
            .where_eq(Self::PRIMARY_KEY, id)
            .first()?
            .map(Self::from_attributes))
    }

    fn find_or_fail(db: &Database, id: impl Into<Value>) -> Result<Self, DbError> {
        let id = id.into();
        Self::find(db, id.clone())?.ok_or_else(|| not_found::<Self>(&id))
    }

    fn all(db: &Database) -> Result<Vec<Self>, DbError> {
        Ok(Self::query(db)
            .get()?
            .into_iter()
            .map(Self::from_attributes)
            .collect())
    }

    /// Mass-assign `attributes` into a new model and save it.
    fn create(db: &Database, attributes: Row) -> Result<Self, DbError> {
        let mut model = Self::make(attributes);
        model.save(db)?;
        Ok(model)
    }

    /// Insert or update. Returns `false` when there was nothing to write.
    fn save(&mut self, db: &Database) -> Result<bool, DbError> {
        let data: Row = self
            .attributes()
            .iter()
            .filter(|(key, _)| key.as_str() != Self::PRIMARY_KEY && Self::FILLABLE.allows(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if data.is_empty() {
            return Ok(false);
        }

        match self.id().cloned() {
            Some(id) => {
                Self::query(db).where_eq(Self::PRIMARY_KEY, id).update(&data)?;
            }
            None => {
                let id = Self::query(db).insert(&data)?;
                self.set(Self::PRIMARY_KEY, id);
            }
        }
        Ok(true)
    }

    /// Delete the row. Returns `false` for unsaved models or rows already gone.
    fn delete(&self, db: &Database) -> Result<bool, DbError> {
        let Some(id) = self.id().cloned() else {
            return Ok(false);
        };
        let deleted = Self::query(db).where_eq(Self::PRIMARY_KEY, id).delete()?;
        Ok(deleted > 0)
    }

    /// Reload attributes from the database.
    fn refresh(&mut self, db: &Database) -> Result<(), DbError> {
        let id = self.id().cloned().unwrap_or(Value::Null);
        let row = Self::query(db)
            .where_eq(Self::PRIMARY_KEY, id.clone())
            .first()?
            .ok_or_else(|| not_found::<Self>(&id))?;
        *self.attributes_mut() = row;
        Ok(())
    }
}

fn not_found<M: Model>(id: &Value) -> DbError {
    DbError::ModelNotFound {
        model: M::model_name(),
        key: M::PRIMARY_KEY,
        id: match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}

/// A model type bound to a database handle.
pub struct Repository<'db, M> {
    db: &'db Database,
    _model: PhantomData<fn() -> M>,
}

impl<'db, M: Model> Repository<'db, M> {
    pub fn new(db: &'db Database) -> Self {
        Self {
            db,
            _model: PhantomData,
        }
    }

    pub fn query(&self) -> QueryBuilder<'db> {
        M::query(self.db)
    }

    pub fn find(&self, id: impl Into<Value>) -> Result<Option<M>, DbError> {
        M::find(self.db, id)
    }

    pub fn find_or_fail(&self, id: impl Into<Value>) -> Result<M, DbError> {
        M::find_or_fail(self.db, id)
    }

    pub fn all(&self) -> Result<Vec<M>, DbError> {
        M::all(self.db)
    }

    /// Rows matching `query`, which must target this model's table.
    pub fn get(&self, query: QueryBuilder<'_>) -> Result<Vec<M>, DbError> {
        Ok(query.get()?.into_iter().map(M::from_attributes).collect())
    }

    pub fn create(&self, attributes: Row) -> Result<M, DbError> {
        M::create(self.db, attributes)
    }

    pub fn save(&self, model: &mut M) -> Result<bool, DbError> {
        model.save(self.db)
    }

    pub fn delete(&self, model: &M) -> Result<bool, DbError> {
        model.delete(self.db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Note {
        attributes: Row,
    }

    impl Model for Note {
        const TABLE: &'static str = "notes";
        const FILLABLE: Fillable = Fillable::Whitelist(&["title", "body"]);

        fn from_attributes(attributes: Row) -> Self {
            Self { attributes }
        }

        fn attributes(&self) -> &Row {
            &self.attributes
        }

        fn attributes_mut(&mut self) -> &mut Row {
            &mut self.attributes
        }
    }

    #[derive(Debug)]
    struct Loose {
        attributes: Row,
    }

    impl Model for Loose {
        const TABLE: &'static str = "notes";

        fn from_attributes(attributes: Row) -> Self {
            Self { attributes }
        }

        fn attributes(&self) -> &Row {
            &self.attributes
        }

        fn attributes_mut(&mut self) -> &mut Row {
            &mut self.attributes
        }
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn db() -> Database {
        let db = Database::in_memory().unwrap();
        db.execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY, title TEXT, body TEXT, pinned INTEGER);")
            .unwrap();
        db
    }

    #[test]
    fn test_fill_whitelist_and_permissive() {
        let note = Note::make(row(json!({"title": "a", "pinned": 1, "id": 9})));
        assert_eq!(note.attributes(), &row(json!({"title": "a"})));

        let loose = Loose::make(row(json!({"title": "a", "pinned": 1})));
        assert_eq!(loose.get("pinned"), Some(&json!(1)));

        assert!(Fillable::Whitelist(&[]).allows("title"));
        assert!(!Fillable::Whitelist(&["body"]).allows("title"));
    }

    #[test]
    fn test_save_inserts_then_updates() {
        let db = db();
        let mut note = Note::make(row(json!({"title": "first"})));
        assert!(note.id().is_none());
        assert!(note.save(&db).unwrap());
        assert_eq!(note.id(), Some(&json!(1)));

        note.fill(row(json!({"title": "renamed"})));
        assert!(note.save(&db).unwrap());
        assert_eq!(Note::all(&db).unwrap().len(), 1);
        assert_eq!(
            Note::find(&db, 1).unwrap().unwrap().get("title"),
            Some(&json!("renamed"))
        );
    }

    #[test]
    fn test_empty_primary_key_string_inserts() {
        let db = db();
        let mut note = Note::from_attributes(row(json!({"id": "", "title": "x"})));
        assert!(note.save(&db).unwrap());
        assert_eq!(note.id(), Some(&json!(1)));
    }

    #[test]
    fn test_save_without_fillable_data_is_noop() {
        let db = db();
        let mut note = Note::make(row(json!({"pinned": 1})));
        assert!(!note.save(&db).unwrap());
        assert_eq!(db.table("notes").count().unwrap(), 0);
    }

    #[test]
    fn test_find_or_fail_and_refresh() {
        let db = db();
        match Note::find_or_fail(&db, 42) {
            Err(DbError::ModelNotFound { model, key, id }) => {
                assert_eq!((model, key, id.as_str()), ("Note", "id", "42"));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let mut note = Note::create(&db, row(json!({"title": "t", "body": "b"}))).unwrap();
        db.table("notes").where_eq("id", 1).update(&row(json!({"body": "changed"}))).unwrap();
        note.refresh(&db).unwrap();
        assert_eq!(note.get("body"), Some(&json!("changed")));

        assert!(note.delete(&db).unwrap());
        assert!(!note.delete(&db).unwrap());
        assert!(matches!(note.refresh(&db), Err(DbError::ModelNotFound { .. })));
    }

    #[test]
    fn test_repository() {
        let db = db();
        let notes: Repository<'_, Note> = Repository::new(&db);
        notes.create(row(json!({"title": "a"}))).unwrap();
        notes.create(row(json!({"title": "b"}))).unwrap();

        assert_eq!(notes.all().unwrap().len(), 2);
        let found = notes.get(notes.query().where_eq("title", "b")).unwrap();
        assert_eq!(found.len(), 1);
        assert!(notes.find_or_fail(3).is_err());
    }
}
