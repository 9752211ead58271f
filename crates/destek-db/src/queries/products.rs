use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};
use uuid::Uuid;

use destek_types::api::{CreateProductRequest, ProductQuery, ProductSort, UpdateProductRequest};
use destek_types::models::Product;

use super::OptionalExt;
use crate::Database;
use crate::models::{self, PRODUCT_COLUMNS};

const MAX_PAGE: u32 = 200;
const DEFAULT_PAGE: u32 = 50;

#[derive(Debug, PartialEq, Eq)]
pub enum DeleteProduct {
    Deleted,
    NotFound,
    /// Orders still reference the product
    HasOrders,
}

impl Database {
    pub fn insert_product(&self, id: Uuid, seller_id: Uuid, req: &CreateProductRequest) -> Result<Product> {
        let (now, now_text) = models::now();
        let product = Product {
            id,
            seller_id,
            name: req.name.clone(),
            description: req.description.clone(),
            price: req.price,
            stock: req.stock,
            rating: 0.0,
            rating_count: 0,
            category: req.category.clone(),
            created_at: now,
            updated_at: now,
        };

        self.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO products ({PRODUCT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, ?7, ?8, ?8)"),
                params![
                    id.to_string(),
                    seller_id.to_string(),
                    product.name,
                    product.description,
                    product.price,
                    product.stock,
                    product.category,
                    now_text,
                ],
            )?;
            Ok(())
        })?;

        Ok(product)
    }

    pub fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        self.with_conn(|conn| query_product(conn, id))
    }

    pub fn list_products(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            values.push(Value::Text(format!("%{}%", escape_like(q))));
            let n = values.len();
            clauses.push(format!("(name LIKE ?{n} ESCAPE '\\' OR description LIKE ?{n} ESCAPE '\\')"));
        }
        if let Some(category) = &query.category {
            values.push(Value::Text(category.clone()));
            clauses.push(format!("category = ?{}", values.len()));
        }
        if let Some(min) = query.min_price {
            values.push(Value::Real(min));
            clauses.push(format!("price >= ?{}", values.len()));
        }
        if let Some(max) = query.max_price {
            values.push(Value::Real(max));
            clauses.push(format!("price <= ?{}", values.len()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let order_sql = match query.sort {
            ProductSort::Newest => "created_at DESC",
            ProductSort::PriceAsc => "price ASC, created_at DESC",
            ProductSort::PriceDesc => "price DESC, created_at DESC",
            ProductSort::Rating => "rating DESC, rating_count DESC",
        };

        values.push(Value::Integer(query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE) as i64));
        let limit_idx = values.len();
        values.push(Value::Integer(query.offset.unwrap_or(0) as i64));
        let offset_idx = values.len();

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM products {where_sql}
                 ORDER BY {order_sql}
                 LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
            ))?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), models::product)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_product(&self, id: Uuid, patch: &UpdateProductRequest) -> Result<Option<Product>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(mut product) = query_product(&tx, id)? else {
                return Ok(None);
            };

            if let Some(name) = &patch.name {
                product.name = name.clone();
            }
            if let Some(description) = &patch.description {
                product.description = description.clone();
            }
            if let Some(price) = patch.price {
                product.price = price;
            }
            if let Some(stock) = patch.stock {
                product.stock = stock;
            }
            if let Some(category) = &patch.category {
                product.category = category.clone();
            }

            let (now, now_text) = models::now();
            product.updated_at = now;

            tx.execute(
                "UPDATE products SET name = ?2, description = ?3, price = ?4, stock = ?5, category = ?6, updated_at = ?7
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    product.name,
                    product.description,
                    product.price,
                    product.stock,
                    product.category,
                    now_text,
                ],
            )?;

            tx.commit()?;
            Ok(Some(product))
        })
    }

    pub fn delete_product(&self, id: Uuid) -> Result<DeleteProduct> {
        self.with_conn(|conn| {
            let id = id.to_string();
            let orders: i64 = conn.query_row(
                "SELECT COUNT(*) FROM orders WHERE product_id = ?1",
                [&id],
                |row| row.get(0),
            )?;
            if orders > 0 {
                return Ok(DeleteProduct::HasOrders);
            }

            let n = conn.execute("DELETE FROM products WHERE id = ?1", [&id])?;
            Ok(if n > 0 { DeleteProduct::Deleted } else { DeleteProduct::NotFound })
        })
    }

    /// Fold one 1-5 star rate into the running average.
    pub fn rate_product(&self, id: Uuid, stars: u8) -> Result<Option<Product>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let n = tx.execute(
                "UPDATE products
                 SET rating = (rating * rating_count + ?2) / (rating_count + 1),
                     rating_count = rating_count + 1
                 WHERE id = ?1",
                params![id.to_string(), stars as f64],
            )?;
            if n == 0 {
                return Ok(None);
            }
            let product = query_product(&tx, id)?;
            tx.commit()?;
            Ok(product)
        })
    }
}

pub(crate) fn query_product(conn: &Connection, id: Uuid) -> Result<Option<Product>> {
    conn.query_row(
        &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
        [id.to_string()],
        models::product,
    )
    .optional()
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::testutil;
    use destek_types::models::Role;

    fn add(db: &Database, seller: Uuid, name: &str, price: f64, category: &str) -> Product {
        db.insert_product(
            Uuid::new_v4(),
            seller,
            &CreateProductRequest {
                name: name.into(),
                description: format!("{name} description"),
                price,
                stock: 10,
                category: category.into(),
            },
        )
        .unwrap()
    }

    #[test]
    fn search_and_filter() {
        let db = testutil::db();
        let seller = testutil::user(&db, Role::Seller);
        add(&db, seller.id, "Organik Toprak", 120.0, "garden");
        add(&db, seller.id, "Saksı", 45.5, "garden");
        add(&db, seller.id, "Kahve Makinesi", 2300.0, "kitchen");

        let q = ProductQuery { q: Some("toprak".into()), ..Default::default() };
        let found = db.list_products(&q).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Organik Toprak");

        let q = ProductQuery {
            category: Some("garden".into()),
            sort: ProductSort::PriceAsc,
            ..Default::default()
        };
        let garden = db.list_products(&q).unwrap();
        assert_eq!(garden.iter().map(|p| p.price).collect::<Vec<_>>(), vec![45.5, 120.0]);

        let q = ProductQuery { min_price: Some(100.0), max_price: Some(1000.0), ..Default::default() };
        assert_eq!(db.list_products(&q).unwrap().len(), 1);

        let q = ProductQuery { limit: Some(2), ..Default::default() };
        assert_eq!(db.list_products(&q).unwrap().len(), 2);

        // A zero limit still returns one row.
        let q = ProductQuery { limit: Some(0), ..Default::default() };
        assert_eq!(db.list_products(&q).unwrap().len(), 1);
    }

    #[test]
    fn like_wildcards_are_literal() {
        let db = testutil::db();
        let seller = testutil::user(&db, Role::Seller);
        add(&db, seller.id, "Plain", 1.0, "misc");
        add(&db, seller.id, "100% cotton", 1.0, "misc");

        let q = ProductQuery { q: Some("%".into()), ..Default::default() };
        let found = db.list_products(&q).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "100% cotton");
    }

    #[test]
    fn partial_update() {
        let db = testutil::db();
        let seller = testutil::user(&db, Role::Seller);
        let p = add(&db, seller.id, "Lamba", 80.0, "home");

        let patch = UpdateProductRequest { price: Some(75.0), stock: Some(3), ..Default::default() };
        let updated = db.update_product(p.id, &patch).unwrap().unwrap();
        assert_eq!(updated.price, 75.0);
        assert_eq!(updated.stock, 3);
        assert_eq!(updated.name, "Lamba");

        assert!(db.update_product(Uuid::new_v4(), &patch).unwrap().is_none());
    }

    #[test]
    fn rating_is_running_average() {
        let db = testutil::db();
        let seller = testutil::user(&db, Role::Seller);
        let p = add(&db, seller.id, "Çaydanlık", 300.0, "kitchen");

        db.rate_product(p.id, 5).unwrap().unwrap();
        let rated = db.rate_product(p.id, 2).unwrap().unwrap();
        assert_eq!(rated.rating_count, 2);
        assert!((rated.rating - 3.5).abs() < f64::EPSILON);

        assert!(db.rate_product(Uuid::new_v4(), 4).unwrap().is_none());
    }

    #[test]
    fn delete_unknown_product() {
        let db = testutil::db();
        assert_eq!(db.delete_product(Uuid::new_v4()).unwrap(), DeleteProduct::NotFound);
    }
}
