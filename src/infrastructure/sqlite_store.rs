//! SQLite 存储
//!
//! 所有语句都使用 `?` 绑定参数，表结构沿用计费系统的
//! `usuarios` / `cliente` / `facturas` / `factores`。
//!
//! `emision` 可能存成日期，也可能存成日期时间；期次一律只比较前 10 个字符，
//! 与 [`SqliteRecordStore::active_period`] 的读取方式一致。

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::debug;

use super::record_store::{NumberingRule, RecordStore, StoreError};
use crate::models::{BillingRecord, Charges, ConfirmationCode, Period};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS usuarios (
        abonado     TEXT PRIMARY KEY,
        estado      TEXT NOT NULL DEFAULT 'N',
        nodoc       TEXT,
        categoria   TEXT,
        zona        TEXT,
        calle       TEXT,
        ley1886     INTEGER NOT NULL DEFAULT 0,
        liberacion  INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cliente (
        cliente TEXT PRIMARY KEY,
        nit     TEXT,
        razon   TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS facturas (
        factura         INTEGER PRIMARY KEY,
        abonado         TEXT NOT NULL,
        emision         TEXT NOT NULL,
        servicio        INTEGER NOT NULL DEFAULT 1,
        lectura         REAL NOT NULL DEFAULT 0,
        con_m3          REAL NOT NULL DEFAULT 0,
        imp_total       REAL NOT NULL DEFAULT 0,
        imp_alcanta     REAL NOT NULL DEFAULT 0,
        imp_rep         REAL NOT NULL DEFAULT 0,
        imp_recargo     REAL NOT NULL DEFAULT 0,
        imp_factura     REAL NOT NULL DEFAULT 0,
        imp_ley1886_1   REAL,
        imp_ley1886_2   REAL,
        fec_pago        TEXT,
        num_factura     INTEGER NOT NULL DEFAULT 0,
        codigo_control  TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_facturas_emision ON facturas (substr(emision, 1, 10), codigo_control)",
    r#"
    CREATE TABLE IF NOT EXISTS factores (
        id       INTEGER PRIMARY KEY AUTOINCREMENT,
        emision  TEXT NOT NULL,
        estado   INTEGER NOT NULL DEFAULT 0,
        proceso  INTEGER NOT NULL DEFAULT 0
    )
    "#,
];

const ELIGIBLE_BATCH_SQL: &str = r#"
    SELECT
        f.factura,
        f.abonado,
        f.lectura,
        f.con_m3,
        f.imp_total,
        f.imp_alcanta,
        f.imp_rep,
        f.imp_recargo,
        f.imp_factura,
        CAST(COALESCE(f.imp_ley1886_1 + f.imp_ley1886_2, 0) AS REAL) AS imp_ley1886,
        f.fec_pago,
        f.num_factura,
        u.nodoc,
        u.categoria,
        u.zona,
        u.calle,
        u.ley1886,
        c.nit,
        c.razon,
        u.liberacion
    FROM facturas f
    LEFT JOIN usuarios u ON u.abonado = f.abonado
    LEFT JOIN cliente c ON c.cliente = u.nodoc
    WHERE substr(f.emision, 1, 10) = ?
      AND f.servicio = 1
      AND f.imp_factura > 0
      AND f.codigo_control IS NULL
    ORDER BY f.num_factura ASC, f.factura ASC
"#;

const MISSING_READINGS_SQL: &str = r#"
    SELECT abonado FROM usuarios
    WHERE estado = 'N'
      AND abonado NOT IN (
          SELECT abonado FROM facturas
          WHERE substr(emision, 1, 10) = ?
            AND servicio = 1
      )
    ORDER BY abonado
"#;

pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// 连接数据库（不存在则创建）并建表
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// 内存数据库（测试用）
    ///
    /// 每个连接各自拥有一个内存库，所以连接池固定为 1 个且不回收。
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 查询记录的确认码
    pub async fn confirmation_of(&self, record_id: i64) -> Result<Option<ConfirmationCode>, StoreError> {
        let row = sqlx::query("SELECT codigo_control FROM facturas WHERE factura = ?")
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(record_id))?;

        let code: Option<String> = row.try_get("codigo_control")?;
        Ok(code.and_then(ConfirmationCode::new))
    }

    fn row_to_record(row: &SqliteRow) -> Result<BillingRecord, StoreError> {
        let text = |column: &str| -> Result<String, StoreError> {
            Ok(row.try_get::<Option<String>, _>(column)?.unwrap_or_default())
        };
        let flag = |column: &str| -> Result<bool, StoreError> {
            Ok(row.try_get::<Option<i64>, _>(column)?.unwrap_or(0) != 0)
        };

        let payment_date = row
            .try_get::<Option<String>, _>("fec_pago")?
            .map(|raw| parse_payment_date(&raw))
            .transpose()?;

        Ok(BillingRecord {
            record_id: row.try_get("factura")?,
            sequence_number: row.try_get("num_factura")?,
            account_id: row.try_get("abonado")?,
            reading: row.try_get("lectura")?,
            consumption_m3: row.try_get("con_m3")?,
            charges: Charges {
                base_total: row.try_get("imp_total")?,
                sewer_surcharge: row.try_get("imp_alcanta")?,
                admin_fee: row.try_get("imp_rep")?,
                penalty_surcharge: row.try_get("imp_recargo")?,
                invoiced_total: row.try_get("imp_factura")?,
                legal_discount: row.try_get("imp_ley1886")?,
            },
            payment_date,
            document_id: text("nodoc")?,
            category: text("categoria")?,
            zone: text("zona")?,
            address: text("calle")?,
            legal_benefit: flag("ley1886")?,
            tax_id: text("nit")?,
            legal_name: text("razon")?,
            exempt: flag("liberacion")?,
        })
    }
}

/// `fec_pago` 可能只存日期，也可能带时间
fn parse_payment_date(raw: &str) -> Result<NaiveDate, StoreError> {
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| StoreError::InvalidData(format!("fec_pago '{raw}': {e}")))
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn eligible_batch(&self, period: &Period) -> Result<Vec<BillingRecord>, StoreError> {
        let rows = sqlx::query(ELIGIBLE_BATCH_SQL)
            .bind(period.as_str())
            .fetch_all(&self.pool)
            .await?;

        debug!("期次 {} 查询到 {} 条待开票记录", period, rows.len());

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn missing_readings(&self, period: &Period) -> Result<BTreeSet<String>, StoreError> {
        let rows = sqlx::query(MISSING_READINGS_SQL)
            .bind(period.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("abonado").map_err(StoreError::from))
            .collect()
    }

    async fn apply_numbering_correction(
        &self,
        period: &Period,
        rule: NumberingRule,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE facturas SET num_factura = factura - ? WHERE num_factura = 0 AND substr(emision, 1, 10) = ?",
        )
        .bind(rule.offset)
        .bind(period.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn set_confirmation(
        &self,
        record_id: i64,
        code: &ConfirmationCode,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE facturas SET codigo_control = ? WHERE factura = ? AND codigo_control IS NULL",
        )
        .bind(code.as_str())
        .bind(record_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.confirmation_of(record_id).await? {
            Some(existing) => Err(StoreError::AlreadyConfirmed {
                record_id,
                existing: existing.to_string(),
            }),
            None => Err(StoreError::Database(format!(
                "记录 {record_id} 确认码写入未生效"
            ))),
        }
    }

    async fn active_period(&self) -> Result<Option<Period>, StoreError> {
        let row = sqlx::query(
            "SELECT emision FROM factores WHERE estado = 1 AND proceso = 1 ORDER BY id LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row.try_get("emision")?;
        let date_part = raw.get(..10).unwrap_or(&raw);
        Period::parse(date_part)
            .map(Some)
            .map_err(|e| StoreError::InvalidData(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_store() -> SqliteRecordStore {
        let store = SqliteRecordStore::in_memory().await.unwrap();
        let pool = store.pool();

        for (abonado, estado, nodoc, ley) in [
            ("100", "N", "C1", 0),
            ("200", "N", "C2", 1),
            ("300", "N", "C3", 0),
            ("400", "B", "C4", 0),
        ] {
            sqlx::query(
                "INSERT INTO usuarios (abonado, estado, nodoc, categoria, zona, calle, ley1886) VALUES (?, ?, ?, 'DOM', 'Central', 'Calle Sucre', ?)",
            )
            .bind(abonado)
            .bind(estado)
            .bind(nodoc)
            .bind(ley)
            .execute(pool)
            .await
            .unwrap();
        }

        sqlx::query("INSERT INTO cliente (cliente, nit, razon) VALUES ('C1', '1234567', 'PEREZ'), ('C2', '0', 'GOMEZ')")
            .execute(pool)
            .await
            .unwrap();

        for (factura, abonado, num, imp, l1, l2) in [
            (1707440_i64, "100", 0_i64, 45.5_f64, None, None),
            (1707441, "200", 3, 30.0, Some(2.0_f64), Some(1.0_f64)),
            (1707442, "200", 1, 0.0, None, None),
        ] {
            sqlx::query(
                "INSERT INTO facturas (factura, abonado, emision, servicio, con_m3, imp_total, imp_factura, imp_ley1886_1, imp_ley1886_2, fec_pago, num_factura) VALUES (?, ?, '2024-05-01', 1, 12.0, ?, ?, ?, ?, '2024-06-10 00:00:00', ?)",
            )
            .bind(factura)
            .bind(abonado)
            .bind(imp)
            .bind(imp)
            .bind(l1)
            .bind(l2)
            .bind(num)
            .execute(pool)
            .await
            .unwrap();
        }

        sqlx::query("INSERT INTO factores (emision, estado, proceso) VALUES ('2024-05-01', 1, 1)")
            .execute(pool)
            .await
            .unwrap();

        store
    }

    fn period() -> Period {
        Period::parse("2024-05-01").unwrap()
    }

    #[tokio::test]
    async fn test_missing_readings() {
        let store = seeded_store().await;
        let missing = store.missing_readings(&period()).await.unwrap();
        assert_eq!(missing.into_iter().collect::<Vec<_>>(), vec!["300".to_string()]);
    }

    #[tokio::test]
    async fn test_numbering_then_batch_order() {
        let store = seeded_store().await;
        let rule = NumberingRule::new(1707433);

        assert_eq!(store.apply_numbering_correction(&period(), rule).await.unwrap(), 1);
        assert_eq!(store.apply_numbering_correction(&period(), rule).await.unwrap(), 0);

        let batch = store.eligible_batch(&period()).await.unwrap();
        let ids: Vec<(i64, i64)> = batch.iter().map(|r| (r.record_id, r.sequence_number)).collect();
        assert_eq!(ids, vec![(1707441, 3), (1707440, 7)]);

        let discounted = &batch[0];
        assert_eq!(discounted.charges.legal_discount, 3.0);
        assert!(discounted.legal_benefit);
        assert_eq!(discounted.tax_id, "0");
        assert_eq!(
            discounted.payment_date,
            NaiveDate::from_ymd_opt(2024, 6, 10)
        );

        assert_eq!(batch[1].charges.legal_discount, 0.0);
        assert_eq!(batch[1].legal_name, "PEREZ");
    }

    #[tokio::test]
    async fn test_confirmation_write_once() {
        let store = seeded_store().await;
        let code = ConfirmationCode::new("CUF-A").unwrap();

        store.set_confirmation(1707441, &code).await.unwrap();
        assert_eq!(store.confirmation_of(1707441).await.unwrap(), Some(code));

        let err = store
            .set_confirmation(1707441, &ConfirmationCode::new("CUF-B").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyConfirmed { .. }));

        let err = store
            .set_confirmation(1, &ConfirmationCode::new("CUF-C").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(1)));

        let batch = store.eligible_batch(&period()).await.unwrap();
        assert!(batch.iter().all(|r| r.record_id != 1707441));
    }

    #[tokio::test]
    async fn test_active_period_from_factores() {
        let store = seeded_store().await;
        assert_eq!(store.active_period().await.unwrap(), Some(period()));
    }

    #[tokio::test]
    async fn test_datetime_emision_matches_active_period() {
        let store = SqliteRecordStore::in_memory().await.unwrap();
        let pool = store.pool();

        sqlx::query("INSERT INTO usuarios (abonado, estado) VALUES ('1', 'N')")
            .execute(pool)
            .await
            .unwrap();
        for (factura, emision) in [
            (1707434_i64, "2024-05-01 00:00:00"),
            (1707435, "2024-06-01 00:00:00"),
        ] {
            sqlx::query(
                "INSERT INTO facturas (factura, abonado, emision, servicio, imp_total, imp_factura) VALUES (?, '1', ?, 1, 20.0, 20.0)",
            )
            .bind(factura)
            .bind(emision)
            .execute(pool)
            .await
            .unwrap();
        }
        sqlx::query("INSERT INTO factores (emision, estado, proceso) VALUES ('2024-05-01 00:00:00', 1, 1)")
            .execute(pool)
            .await
            .unwrap();

        let active = store.active_period().await.unwrap().unwrap();
        assert_eq!(active, period());

        assert!(store.missing_readings(&active).await.unwrap().is_empty());
        assert_eq!(
            store
                .apply_numbering_correction(&active, NumberingRule::new(1707433))
                .await
                .unwrap(),
            1
        );

        let batch = store.eligible_batch(&active).await.unwrap();
        let ids: Vec<(i64, i64)> = batch.iter().map(|r| (r.record_id, r.sequence_number)).collect();
        assert_eq!(ids, vec![(1707434, 1)]);
    }
}
