// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PostgreSQL store: objects, catalog, index tables and the compile queue.
//!
//! Objects are kept as a JSONB body plus the compiled columns the worker
//! writes back. Bulk writes use UNNEST so one statement covers a chunk.

use std::time::Duration;

use async_trait::async_trait;
use diagram_compiler::{
    CatalogSource, CloneReplacement, CompiledObject, IdAllocator, IndexStore, IndexTransaction,
    LiveValueSource, ObjectStore, WorkQueue,
};
use diagram_core::{
    Catalog, CompileQueueItem, CoordinateSpace, DisplayLevel, DownstreamSignal, Error,
    GraphicObject, GridIndexEntry, GridKey, GridLevel, LiveValue, LocationDescriptor,
    LocationIndexEntry, ModelNamespace, ObjectId, Point, Result, TextStyle,
};
use rustc_hash::FxHashMap;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

const BATCH_SIZE: usize = 10_000;

type ObjectRow = (
    i64,
    Json<GraphicObject>,
    Option<String>,
    Option<String>,
    Option<f64>,
    Option<f64>,
);

fn db(err: sqlx::Error) -> Error {
    Error::store(err)
}

/// Rebuilds an object from its body and compiled columns.
fn object_from_row((id, Json(mut object), hash_id, payload, loc_x, loc_y): ObjectRow) -> GraphicObject {
    object.id = id;
    object.hash_id = hash_id;
    object.payload = payload;
    object.location = match (loc_x, loc_y) {
        (Some(x), Some(y)) => Some(LocationDescriptor {
            coord_space_id: object.coord_space_id,
            object_id: id,
            x,
            y,
        }),
        _ => None,
    };
    object
}

fn parse_grid_key(raw: &str) -> Result<GridKey> {
    raw.parse()
        .map_err(|err| Error::InvariantViolation(format!("stored {}", err)))
}

/// Bucket numbers are stored in an INT column.
fn bucket_column(bucket: u32) -> Result<i32> {
    i32::try_from(bucket).map_err(|_| {
        Error::InvariantViolation(format!("location bucket {} does not fit the index column", bucket))
    })
}

fn bucket_from_column(raw: i32) -> Result<u32> {
    u32::try_from(raw)
        .map_err(|_| Error::InvariantViolation(format!("stored location bucket {}", raw)))
}

/// Store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

#[async_trait]
impl ObjectStore for PgStore {
    async fn load_objects(&self, ids: &[ObjectId]) -> Result<Vec<GraphicObject>> {
        let rows = sqlx::query_as::<_, ObjectRow>(
            r#"
            SELECT id, body, hash_id, payload, loc_x, loc_y
            FROM disp_object
            WHERE id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        Ok(rows.into_iter().map(object_from_row).collect())
    }

    async fn load_children(
        &self,
        owner_ids: &[ObjectId],
    ) -> Result<FxHashMap<ObjectId, Vec<GraphicObject>>> {
        let rows = sqlx::query_as::<_, ObjectRow>(
            r#"
            SELECT id, body, hash_id, payload, loc_x, loc_y
            FROM disp_object
            WHERE group_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(owner_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut children: FxHashMap<ObjectId, Vec<GraphicObject>> = FxHashMap::default();
        for object in rows.into_iter().map(object_from_row) {
            if let Some(owner) = object.group_id {
                children.entry(owner).or_default().push(object);
            }
        }
        Ok(children)
    }
}

#[async_trait]
impl CatalogSource for PgStore {
    async fn load_catalog(&self) -> Result<Catalog> {
        let mut catalog = Catalog::new();

        let namespaces = sqlx::query_as::<_, (i32, String)>("SELECT id, name FROM disp_namespace")
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        for (id, name) in namespaces {
            catalog.add_namespace(ModelNamespace { id, name });
        }

        let spaces = sqlx::query_as::<
            _,
            (i32, String, i32, Option<f64>, Option<f64>, Option<f64>, Json<Vec<GridLevel>>),
        >(
            r#"
            SELECT id, name, model_set_id, scale, offset_x, offset_y, grid_levels
            FROM disp_coord_space
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        for (id, name, model_set_id, scale, offset_x, offset_y, Json(grid_levels)) in spaces {
            catalog.add_coord_space(CoordinateSpace {
                id,
                name,
                model_set_id,
                scale,
                offset: offset_x.zip(offset_y).map(|(x, y)| Point::new(x, y)),
                grid_levels,
            });
        }

        let styles = sqlx::query_as::<_, (i32, f64, f64)>(
            "SELECT id, font_size, scale_factor FROM disp_text_style",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        for (id, font_size, scale_factor) in styles {
            catalog.add_text_style(TextStyle {
                id,
                font_size,
                scale_factor,
            });
        }

        let levels = sqlx::query_as::<_, (i32, f64, f64)>(
            "SELECT id, min_zoom, max_zoom FROM disp_level",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        for (id, min_zoom, max_zoom) in levels {
            catalog.add_level(DisplayLevel {
                id,
                min_zoom,
                max_zoom,
            });
        }

        Ok(catalog)
    }
}

#[async_trait]
impl IdAllocator for PgStore {
    async fn reserve(&self, count: usize) -> Result<Vec<ObjectId>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        sqlx::query_scalar("SELECT nextval('disp_object_id_seq') FROM generate_series(1, $1)")
            .bind(count as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db)
    }
}

#[async_trait]
impl LiveValueSource for PgStore {
    async fn fetch(&self, namespace: &str, keys: &[String]) -> Result<FxHashMap<String, LiveValue>> {
        let rows = sqlx::query_as::<_, (String, Option<String>, Option<String>, Option<i64>)>(
            r#"
            SELECT key, raw, display, color_id
            FROM disp_live_value
            WHERE namespace = $1 AND key = ANY($2)
            "#,
        )
        .bind(namespace)
        .bind(keys)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        Ok(rows
            .into_iter()
            .map(|(key, raw, display, color_id)| {
                (
                    key,
                    LiveValue {
                        raw,
                        display,
                        color_id,
                    },
                )
            })
            .collect())
    }
}

#[async_trait]
impl IndexStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn IndexTransaction + '_>> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        Ok(Box::new(PgIndexTransaction { tx }))
    }
}

/// One index transaction on a pooled connection.
pub struct PgIndexTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl IndexTransaction for PgIndexTransaction {
    async fn lock_objects(&mut self, ids: &[ObjectId]) -> Result<Vec<ObjectId>> {
        sqlx::query_scalar("SELECT id FROM disp_object WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(ids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db)
    }

    async fn replace_clones(&mut self, replacement: &CloneReplacement) -> Result<Vec<ObjectId>> {
        let retired: Vec<i64> = sqlx::query_scalar(
            "DELETE FROM disp_object WHERE group_id = ANY($1) RETURNING id",
        )
        .bind(&replacement.owner_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db)?;

        for chunk in replacement.clones.chunks(BATCH_SIZE) {
            let ids: Vec<i64> = chunk.iter().map(|c| c.id).collect();
            let group_ids: Vec<Option<i64>> = chunk.iter().map(|c| c.group_id).collect();
            let bodies = chunk
                .iter()
                .map(serde_json::to_value)
                .collect::<std::result::Result<Vec<_>, _>>()?;

            sqlx::query(
                r#"
                INSERT INTO disp_object (id, group_id, body)
                SELECT * FROM UNNEST($1::BIGINT[], $2::BIGINT[], $3::JSONB[])
                "#,
            )
            .bind(&ids)
            .bind(&group_ids)
            .bind(&bodies)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        }

        if !replacement.target_names.is_empty() {
            let (pointer_ids, names): (Vec<i64>, Vec<String>) =
                replacement.target_names.iter().cloned().unzip();
            sqlx::query(
                r#"
                UPDATE disp_object o
                SET body = jsonb_set(o.body, '{kind,target_group_name}', to_jsonb(t.name))
                FROM UNNEST($1::BIGINT[], $2::VARCHAR[]) AS t(id, name)
                WHERE o.id = t.id
                "#,
            )
            .bind(&pointer_ids)
            .bind(&names)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        }

        Ok(retired)
    }

    async fn delete_index_rows(&mut self, ids: &[ObjectId]) -> Result<Vec<DownstreamSignal>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let grid = sqlx::query_as::<_, (i32, String)>(
            "DELETE FROM disp_grid_index WHERE object_id = ANY($1) RETURNING coord_space_id, grid_key",
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db)?;

        let locations = sqlx::query_as::<_, (i32, i32)>(
            "DELETE FROM disp_location_index WHERE object_id = ANY($1) RETURNING model_set_id, index_bucket",
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db)?;

        let mut vacated = Vec::with_capacity(grid.len() + locations.len());
        for (coord_space_id, raw) in grid {
            vacated.push(DownstreamSignal::Grid {
                coord_space_id,
                grid_key: parse_grid_key(&raw)?,
            });
        }
        for (model_set_id, bucket) in locations {
            vacated.push(DownstreamSignal::Location {
                model_set_id,
                index_bucket: bucket_from_column(bucket)?,
            });
        }
        Ok(vacated)
    }

    async fn insert_grid_entries(&mut self, entries: &[GridIndexEntry]) -> Result<u64> {
        let mut inserted = 0;
        for chunk in entries.chunks(BATCH_SIZE) {
            let len = chunk.len();
            let mut object_ids = Vec::with_capacity(len);
            let mut coord_space_ids = Vec::with_capacity(len);
            let mut grid_keys = Vec::with_capacity(len);
            let mut import_hashes: Vec<Option<String>> = Vec::with_capacity(len);

            for entry in chunk {
                object_ids.push(entry.object_id);
                coord_space_ids.push(entry.coord_space_id);
                grid_keys.push(entry.grid_key.to_string());
                import_hashes.push(entry.import_group_hash.clone());
            }

            inserted += sqlx::query(
                r#"
                INSERT INTO disp_grid_index
                    (object_id, coord_space_id, grid_key, import_group_hash)
                SELECT * FROM UNNEST(
                    $1::BIGINT[],
                    $2::INT[],
                    $3::VARCHAR[],
                    $4::VARCHAR[]
                )
                "#,
            )
            .bind(&object_ids)
            .bind(&coord_space_ids)
            .bind(&grid_keys)
            .bind(&import_hashes)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?
            .rows_affected();
        }
        Ok(inserted)
    }

    async fn insert_location_entries(&mut self, entries: &[LocationIndexEntry]) -> Result<u64> {
        let mut inserted = 0;
        for chunk in entries.chunks(BATCH_SIZE) {
            let object_ids: Vec<i64> = chunk.iter().map(|e| e.object_id).collect();
            let model_set_ids: Vec<i32> = chunk.iter().map(|e| e.model_set_id).collect();
            let buckets = chunk
                .iter()
                .map(|e| bucket_column(e.index_bucket))
                .collect::<Result<Vec<i32>>>()?;

            inserted += sqlx::query(
                r#"
                INSERT INTO disp_location_index (object_id, model_set_id, index_bucket)
                SELECT * FROM UNNEST($1::BIGINT[], $2::INT[], $3::INT[])
                "#,
            )
            .bind(&object_ids)
            .bind(&model_set_ids)
            .bind(&buckets)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?
            .rows_affected();
        }
        Ok(inserted)
    }

    async fn save_compiled(&mut self, objects: &[CompiledObject]) -> Result<u64> {
        let mut updated = 0;
        for chunk in objects.chunks(BATCH_SIZE) {
            let len = chunk.len();
            let mut ids = Vec::with_capacity(len);
            let mut hashes = Vec::with_capacity(len);
            let mut payloads = Vec::with_capacity(len);
            let mut xs: Vec<Option<f64>> = Vec::with_capacity(len);
            let mut ys: Vec<Option<f64>> = Vec::with_capacity(len);

            for object in chunk {
                ids.push(object.object_id);
                hashes.push(object.hash_id.clone());
                payloads.push(object.payload.clone());
                xs.push(object.location.map(|l| l.x));
                ys.push(object.location.map(|l| l.y));
            }

            updated += sqlx::query(
                r#"
                UPDATE disp_object o
                SET hash_id = t.hash_id, payload = t.payload, loc_x = t.loc_x, loc_y = t.loc_y
                FROM UNNEST(
                    $1::BIGINT[],
                    $2::VARCHAR[],
                    $3::TEXT[],
                    $4::DOUBLE PRECISION[],
                    $5::DOUBLE PRECISION[]
                ) AS t(id, hash_id, payload, loc_x, loc_y)
                WHERE o.id = t.id
                "#,
            )
            .bind(&ids)
            .bind(&hashes)
            .bind(&payloads)
            .bind(&xs)
            .bind(&ys)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?
            .rows_affected();
        }
        Ok(updated)
    }

    async fn publish_signals(&mut self, signals: &[DownstreamSignal]) -> Result<u64> {
        let mut grid_spaces = Vec::new();
        let mut grid_keys = Vec::new();
        let mut model_sets = Vec::new();
        let mut buckets = Vec::new();

        for signal in signals {
            match signal {
                DownstreamSignal::Grid {
                    coord_space_id,
                    grid_key,
                } => {
                    grid_spaces.push(*coord_space_id);
                    grid_keys.push(grid_key.to_string());
                }
                DownstreamSignal::Location {
                    model_set_id,
                    index_bucket,
                } => {
                    model_sets.push(*model_set_id);
                    buckets.push(bucket_column(*index_bucket)?);
                }
            }
        }

        let mut queued = 0;
        if !grid_keys.is_empty() {
            queued += sqlx::query(
                r#"
                INSERT INTO disp_grid_queue (coord_space_id, grid_key)
                SELECT * FROM UNNEST($1::INT[], $2::VARCHAR[])
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(&grid_spaces)
            .bind(&grid_keys)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?
            .rows_affected();
        }
        if !buckets.is_empty() {
            queued += sqlx::query(
                r#"
                INSERT INTO disp_location_queue (model_set_id, index_bucket)
                SELECT * FROM UNNEST($1::INT[], $2::INT[])
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(&model_sets)
            .bind(&buckets)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?
            .rows_affected();
        }
        Ok(queued)
    }

    async fn dequeue(&mut self, item_ids: &[i64]) -> Result<u64> {
        sqlx::query("DELETE FROM disp_compile_queue WHERE id = ANY($1)")
            .bind(item_ids)
            .execute(&mut *self.tx)
            .await
            .map(|r| r.rows_affected())
            .map_err(db)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(db)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(db)
    }
}

#[async_trait]
impl WorkQueue for PgStore {
    async fn claim(&self, limit: usize, lease: Duration) -> Result<Vec<CompileQueueItem>> {
        let rows = sqlx::query_as::<_, (i64, i64, i32)>(
            r#"
            UPDATE disp_compile_queue q
            SET visible_at = now() + make_interval(secs => $2)
            WHERE q.id IN (
                SELECT id FROM disp_compile_queue
                WHERE visible_at <= now()
                ORDER BY id
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING q.id, q.object_id, q.attempts
            "#,
        )
        .bind(limit as i64)
        .bind(lease.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut items: Vec<CompileQueueItem> = rows
            .into_iter()
            .map(|(id, object_id, attempts)| CompileQueueItem {
                id,
                object_id,
                attempts: attempts.max(0) as u32,
            })
            .collect();
        items.sort_by_key(|item| item.id);
        Ok(items)
    }

    async fn release(&self, items: &[CompileQueueItem], delay: Duration, error: &str) -> Result<()> {
        let ids: Vec<i64> = items.iter().map(|item| item.id).collect();
        sqlx::query(
            r#"
            UPDATE disp_compile_queue
            SET attempts = attempts + 1,
                visible_at = now() + make_interval(secs => $2),
                last_error = $3
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .bind(delay.as_secs_f64())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn dead_letter(&self, items: &[CompileQueueItem], error: &str) -> Result<()> {
        let ids: Vec<i64> = items.iter().map(|item| item.id).collect();
        sqlx::query(
            r#"
            WITH moved AS (
                DELETE FROM disp_compile_queue WHERE id = ANY($1)
                RETURNING id, object_id, attempts
            )
            INSERT INTO disp_compile_dead_letter (id, object_id, attempts, error)
            SELECT id, object_id, attempts + 1, $2 FROM moved
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&ids)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagram_core::ObjectKind;

    #[test]
    fn compiled_columns_override_the_body() {
        let mut body = GraphicObject::new(7, 3, ObjectKind::Polyline).with_geometry(&[[1.0, 2.0]]);
        body.hash_id = Some("stale".into());

        let object = object_from_row((
            7,
            Json(body),
            Some("fresh".into()),
            Some("{}".into()),
            Some(4.0),
            Some(5.0),
        ));

        assert_eq!(object.hash_id.as_deref(), Some("fresh"));
        let location = object.location.unwrap();
        assert_eq!(location.object_id, 7);
        assert_eq!(location.coord_space_id, 3);
        assert_eq!((location.x, location.y), (4.0, 5.0));
    }

    #[test]
    fn half_a_location_is_none() {
        let body = GraphicObject::new(1, 1, ObjectKind::Polygon);
        let object = object_from_row((1, Json(body), None, None, Some(1.0), None));
        assert!(object.location.is_none());
    }

    #[test]
    fn stored_grid_keys_round_trip() {
        let key = parse_grid_key("3.0:-2.5").unwrap();
        assert_eq!(
            key,
            GridKey::Cell {
                coord_space_id: 3,
                level: 0,
                x: -2,
                y: 5
            }
        );
        assert!(parse_grid_key("garbage").unwrap_err().is_invariant_violation());
    }

    #[test]
    fn buckets_outside_the_int_column_are_rejected() {
        assert_eq!(bucket_column(8191).unwrap(), 8191);
        assert!(bucket_column(u32::MAX).unwrap_err().is_invariant_violation());
        assert!(bucket_from_column(-1).unwrap_err().is_invariant_violation());
    }
}
