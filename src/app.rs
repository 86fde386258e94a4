//! The storefront catalog application.
//!
//! # Responsibilities
//! - Define the `Product` model and its schema
//! - Expose product CRUD and purchase through `ProductController`
//! - Register routes, middleware and controllers on a [`Router`]
//!
//! # Routes
//! ```text
//! GET        /health                        closure
//! GET        /api/products                  ProductController@index
//! GET        /api/products/{id}             ProductController@show
//! POST       /api/products                  ProductController@store
//! PUT|PATCH  /api/products/{id}             ProductController@update
//! DELETE     /api/products/{id}             ProductController@destroy
//! POST       /api/products/{id}/purchase    ProductController@purchase
//! ```
//! Everything under `/api` runs behind the `trim` middleware.

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{json, Value};

use crate::cache::Cache;
use crate::db::{Database, DbError, Direction, Fillable, Model, QueryBuilder, Row};
use crate::http::{Request, Response};
use crate::routing::coerce::coerce;
use crate::routing::{
    Args, Controller, DispatchError, Handler, Middleware, Next, ParamType, ParameterSet,
    RouteError, Router,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS products (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    name    TEXT    NOT NULL,
    price   REAL    NOT NULL DEFAULT 0,
    stock   INTEGER NOT NULL DEFAULT 0,
    active  INTEGER NOT NULL DEFAULT 1
);
";

const MAX_PER_PAGE: i64 = 100;

/// Create the catalog tables if they do not exist.
pub fn migrate(db: &Database) -> Result<(), DbError> {
    db.execute_batch(SCHEMA)?;
    tracing::info!(dsn = %db.dsn(), "Schema ready");
    Ok(())
}

/// A catalog product.
#[derive(Debug, Clone, Default)]
pub struct Product {
    attributes: Row,
}

impl Model for Product {
    const TABLE: &'static str = "products";
    const FILLABLE: Fillable = Fillable::Whitelist(&["name", "price", "stock", "active"]);

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

impl Product {
    pub fn stock(&self) -> i64 {
        self.get("stock").and_then(Value::as_i64).unwrap_or(0)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.attributes.clone())
    }
}

/// Trims surrounding whitespace from every string parameter.
#[derive(Debug, Default)]
pub struct TrimStrings;

impl Middleware for TrimStrings {
    fn handle(
        &self,
        _request: &Request,
        mut params: ParameterSet,
        next: Next<'_>,
    ) -> Result<Response, DispatchError> {
        for value in params.values_mut() {
            if let Value::String(text) = value {
                let trimmed = text.trim();
                if trimmed.len() != text.len() {
                    *text = trimmed.to_string();
                }
            }
        }
        next.run(params)
    }
}

/// Product endpoints.
#[derive(Debug, Clone)]
pub struct ProductController {
    db: Database,
    cache: Cache,
}

impl ProductController {
    pub fn new(db: Database, cache: Cache) -> Self {
        Self { db, cache }
    }

    fn index(&self, args: &Args) -> Result<Response, DispatchError> {
        let page = args.int("page").unwrap_or(1).max(1);
        let per_page = args.int("per_page").unwrap_or(20).clamp(1, MAX_PER_PAGE);
        let offset = (page - 1)
            .checked_mul(per_page)
            .ok_or_else(|| DispatchError::abort(StatusCode::BAD_REQUEST, "page is out of range"))?;
        let search = args.str("q").filter(|q| !q.is_empty());
        let active = args.bool("active");

        let key = format!(
            "products:index:{page}:{per_page}:{}:{}",
            search.unwrap_or_default(),
            active.map_or_else(|| "any".to_string(), |a| a.to_string())
        );

        let listing = self.cache.remember(&key, self.cache.default_ttl(), || {
            let total = self.filtered(search, active).count()?;
            let rows = self
                .filtered(search, active)
                .order_by("id", Direction::Asc)
                .limit(per_page as u64)
                .offset(offset as u64)
                .get()?;
            Ok::<_, DbError>(json!({
                "data": rows,
                "page": page,
                "per_page": per_page,
                "total": total,
            }))
        })?;
        Ok(Response::json(listing))
    }

    fn filtered(&self, search: Option<&str>, active: Option<bool>) -> QueryBuilder<'_> {
        let mut query = Product::query(&self.db);
        if let Some(search) = search {
            query = query.where_like("name", format!("%{search}%"));
        }
        if let Some(active) = active {
            query = query.where_eq("active", active);
        }
        query
    }

    fn show(&self, args: &Args) -> Result<Response, DispatchError> {
        let product = Product::find_or_fail(&self.db, id_of(args)?)?;
        Ok(Response::json(product.to_json()))
    }

    fn store(&self, args: &Args) -> Result<Response, DispatchError> {
        let attributes = validated(args.params(), true)?;
        let product = Product::create(&self.db, attributes)?;
        self.cache.flush();

        let id = product.id().cloned().unwrap_or(Value::Null);
        tracing::info!(id = %id, "Product created");
        Ok(Response::json(product.to_json())
            .with_status(StatusCode::CREATED)
            .with_header("location", &format!("/api/products/{id}")))
    }

    fn update(&self, args: &Args) -> Result<Response, DispatchError> {
        let mut product = Product::find_or_fail(&self.db, id_of(args)?)?;
        let attributes = validated(args.params(), false)?;
        product.fill(attributes);
        product.save(&self.db)?;
        self.cache.flush();
        Ok(Response::json(product.to_json()))
    }

    fn destroy(&self, args: &Args) -> Result<Response, DispatchError> {
        let product = Product::find_or_fail(&self.db, id_of(args)?)?;
        product.delete(&self.db)?;
        self.cache.flush();
        Ok(Response::no_content())
    }

    /// Decrement stock atomically; 409 when there is not enough.
    fn purchase(&self, args: &Args) -> Result<Response, DispatchError> {
        let id = id_of(args)?;
        let quantity = args.int("quantity").unwrap_or(1);
        if quantity < 1 {
            return Err(DispatchError::abort(
                StatusCode::UNPROCESSABLE_ENTITY,
                "quantity must be at least 1",
            ));
        }

        let product = self
            .db
            .transaction(|tx| -> Result<Product, DispatchError> {
                let mut product = Product::find_or_fail(tx, id)?;
                let stock = product.stock();
                if stock < quantity {
                    return Err(DispatchError::abort(
                        StatusCode::CONFLICT,
                        format!("only {stock} left in stock"),
                    ));
                }
                product.set("stock", stock - quantity);
                product.save(tx)?;
                Ok(product)
            })
            .map_err(unwrap_transaction)?;

        self.cache.flush();
        Ok(Response::json(product.to_json()))
    }
}

impl Controller for ProductController {
    fn action(&self, method: &str) -> Option<Handler> {
        let this = self.clone();
        let handler = match method {
            "index" => Handler::new(move |args| this.index(&args))
                .param_or("page", ParamType::Int, 1)
                .param_or("per_page", ParamType::Int, 20)
                .param("q", ParamType::Str)
                .param("active", ParamType::Bool),
            "show" => Handler::new(move |args| this.show(&args)).param("id", ParamType::Int),
            "store" => Handler::new(move |args| this.store(&args)),
            "update" => Handler::new(move |args| this.update(&args)).param("id", ParamType::Int),
            "destroy" => Handler::new(move |args| this.destroy(&args)).param("id", ParamType::Int),
            "purchase" => Handler::new(move |args| this.purchase(&args))
                .param("id", ParamType::Int)
                .param_or("quantity", ParamType::Int, 1),
            _ => return None,
        };
        Some(handler)
    }
}

fn id_of(args: &Args) -> Result<i64, DispatchError> {
    args.int("id")
        .ok_or_else(|| DispatchError::abort(StatusCode::BAD_REQUEST, "missing product id"))
}

/// Check and normalize writable product fields.
fn validated(params: &ParameterSet, creating: bool) -> Result<Row, DispatchError> {
    let mut row = Row::new();

    match params.get("name") {
        Some(Value::String(name)) if !name.is_empty() => {
            row.insert("name".to_string(), Value::String(name.clone()));
        }
        None if !creating => {}
        _ => {
            return Err(DispatchError::abort(
                StatusCode::UNPROCESSABLE_ENTITY,
                "name is required",
            ))
        }
    }

    for (field, ty) in [
        ("price", ParamType::Float),
        ("stock", ParamType::Int),
        ("active", ParamType::Bool),
    ] {
        let Some(raw) = params.get(field) else {
            continue;
        };
        let value = coerce(field, raw, &ty)?.to_value().unwrap_or(Value::Null);
        if value.as_f64().is_some_and(|n| n < 0.0) {
            return Err(DispatchError::abort(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("{field} must not be negative"),
            ));
        }
        row.insert(field.to_string(), value);
    }

    Ok(row)
}

/// Recover the handler's own error from a rolled-back transaction.
fn unwrap_transaction(err: DbError) -> DispatchError {
    match err {
        DbError::Transaction(tx) => match tx.into_cause().downcast::<DispatchError>() {
            Ok(cause) => *cause,
            Err(other) => DispatchError::abort(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        },
        other => other.into(),
    }
}

/// Build the application router on `db` and `cache`.
pub fn build(db: Database, cache: Cache) -> Result<Router, RouteError> {
    let mut router = Router::new();
    router
        .container_mut()
        .instance(
            "ProductController",
            Arc::new(ProductController::new(db.clone(), cache)),
        )
        .register_middleware::<TrimStrings>("trim");

    let health_db = db;
    router
        .get(
            "/health",
            Handler::new(move |_| {
                health_db.raw("SELECT 1 AS ok", &[])?;
                Ok(Response::json(json!({ "status": "ok" })))
            }),
        )?
        .name("health");

    router.group("/api", vec!["trim".into()], |r| {
        r.get("/products", "ProductController@index")?
            .name("products.index");
        r.get("/products/{id:\\d+}", "ProductController@show")?
            .name("products.show");
        r.post("/products", "ProductController@store")?
            .name("products.store");
        r.match_methods(&["PUT", "PATCH"], "/products/{id:\\d+}", "ProductController@update")?
            .name("products.update");
        r.delete("/products/{id:\\d+}", "ProductController@destroy")?
            .name("products.destroy");
        r.post("/products/{id}/purchase", ("ProductController", "purchase"))?
            .where_param("id", r"\d+")?
            .name("products.purchase");
        Ok(())
    })?;

    Ok(router)
}
