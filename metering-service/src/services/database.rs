//! Database service for metering-service.
//!
//! Every SQL statement lives here. Correctness under concurrent requests
//! from multiple server processes relies on conditional updates (guarded
//! `UPDATE ... WHERE` clauses) and unique constraints, never on in-process
//! locking.

use crate::models::{
    NewWalletTransaction, OrgSubscription, PlanCode, PlanLimitConfig, StorageBillingRecord,
    StorageUsage, UpsertOrgSubscription, UsageCounter, UsageKind, Wallet, WalletTransaction,
};
use crate::services::metrics::DB_QUERY_DURATION;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgConnection;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "metering-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Subscription & Plan Config Operations
    // =========================================================================

    /// Get an organization's subscription record.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn get_org_subscription(
        &self,
        org_id: Uuid,
    ) -> Result<Option<OrgSubscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_org_subscription"])
            .start_timer();

        let subscription = sqlx::query_as::<_, OrgSubscription>(
            r#"
            SELECT org_id, plan, seats_override, projects_override, publications_override, tasks_weekly_override, created_utc, updated_utc
            FROM org_subscriptions
            WHERE org_id = $1
            "#,
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get subscription: {}", e)))?;

        timer.observe_duration();

        Ok(subscription)
    }

    /// Create or replace an organization's subscription record.
    #[instrument(skip(self, input), fields(org_id = %input.org_id, plan = %input.plan))]
    pub async fn upsert_org_subscription(
        &self,
        input: &UpsertOrgSubscription,
    ) -> Result<OrgSubscription, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_org_subscription"])
            .start_timer();

        let subscription = sqlx::query_as::<_, OrgSubscription>(
            r#"
            INSERT INTO org_subscriptions (org_id, plan, seats_override, projects_override, publications_override, tasks_weekly_override)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (org_id) DO UPDATE
            SET plan = EXCLUDED.plan,
                seats_override = EXCLUDED.seats_override,
                projects_override = EXCLUDED.projects_override,
                publications_override = EXCLUDED.publications_override,
                tasks_weekly_override = EXCLUDED.tasks_weekly_override,
                updated_utc = NOW()
            RETURNING org_id, plan, seats_override, projects_override, publications_override, tasks_weekly_override, created_utc, updated_utc
            "#,
        )
        .bind(input.org_id)
        .bind(input.plan.as_str())
        .bind(input.overrides.seats)
        .bind(input.overrides.projects)
        .bind(input.overrides.publications)
        .bind(input.overrides.tasks_weekly)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to upsert subscription: {}", e)))?;

        timer.observe_duration();
        info!(org_id = %subscription.org_id, plan = %subscription.plan, "Subscription upserted");

        Ok(subscription)
    }

    /// Get the stored limit configuration for a plan tier, if any.
    #[instrument(skip(self))]
    pub async fn get_plan_limit_config(
        &self,
        plan: PlanCode,
    ) -> Result<Option<PlanLimitConfig>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_plan_limit_config"])
            .start_timer();

        let config = sqlx::query_as::<_, PlanLimitConfig>(
            r#"
            SELECT plan, seats, projects, publications, tasks_weekly, updated_utc
            FROM plan_limit_configs
            WHERE plan = $1
            "#,
        )
        .bind(plan.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get plan config: {}", e)))?;

        timer.observe_duration();

        Ok(config)
    }

    /// Create or replace a plan tier's stored limit configuration.
    #[instrument(skip(self, limits))]
    pub async fn upsert_plan_limit_config(
        &self,
        plan: PlanCode,
        limits: &crate::models::PlanLimits,
    ) -> Result<PlanLimitConfig, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_plan_limit_config"])
            .start_timer();

        let config = sqlx::query_as::<_, PlanLimitConfig>(
            r#"
            INSERT INTO plan_limit_configs (plan, seats, projects, publications, tasks_weekly)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (plan) DO UPDATE
            SET seats = EXCLUDED.seats,
                projects = EXCLUDED.projects,
                publications = EXCLUDED.publications,
                tasks_weekly = EXCLUDED.tasks_weekly,
                updated_utc = NOW()
            RETURNING plan, seats, projects, publications, tasks_weekly, updated_utc
            "#,
        )
        .bind(plan.as_str())
        .bind(limits.seats)
        .bind(limits.projects)
        .bind(limits.publications)
        .bind(limits.tasks_weekly)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to upsert plan config: {}", e)))?;

        timer.observe_duration();

        Ok(config)
    }

    // =========================================================================
    // Usage Counter Operations
    // =========================================================================

    /// Get the usage counter for an organization and period, if it exists.
    #[instrument(skip(self), fields(org_id = %org_id, period = %period))]
    pub async fn get_usage_counter(
        &self,
        org_id: Uuid,
        period: &str,
    ) -> Result<Option<UsageCounter>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_usage_counter"])
            .start_timer();

        let counter = sqlx::query_as::<_, UsageCounter>(
            r#"
            SELECT counter_id, org_id, period, projects_used, publications_used, tasks_used, created_utc, updated_utc
            FROM usage_counters
            WHERE org_id = $1 AND period = $2
            "#,
        )
        .bind(org_id)
        .bind(period)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get usage counter: {}", e)))?;

        timer.observe_duration();

        Ok(counter)
    }

    /// Attempt the guarded increment for one usage kind.
    ///
    /// The limit check happens inside the UPDATE itself, so two requests
    /// racing past the caller's fast-path read cannot both take the last
    /// slot. Returns the new count, or `None` when no row matched (counter
    /// missing, or the limit already held at write time).
    #[instrument(skip(self), fields(org_id = %org_id, period = %period, kind = %kind))]
    pub async fn try_increment_usage(
        &self,
        org_id: Uuid,
        period: &str,
        kind: UsageKind,
        limit: Option<i32>,
    ) -> Result<Option<i32>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["try_increment_usage"])
            .start_timer();

        let sql = match kind {
            UsageKind::Projects => {
                r#"
                UPDATE usage_counters
                SET projects_used = projects_used + 1, updated_utc = NOW()
                WHERE org_id = $1 AND period = $2 AND ($3::int IS NULL OR projects_used < $3)
                RETURNING projects_used
                "#
            }
            UsageKind::Publications => {
                r#"
                UPDATE usage_counters
                SET publications_used = publications_used + 1, updated_utc = NOW()
                WHERE org_id = $1 AND period = $2 AND ($3::int IS NULL OR publications_used < $3)
                RETURNING publications_used
                "#
            }
            UsageKind::Tasks => {
                r#"
                UPDATE usage_counters
                SET tasks_used = tasks_used + 1, updated_utc = NOW()
                WHERE org_id = $1 AND period = $2 AND ($3::int IS NULL OR tasks_used < $3)
                RETURNING tasks_used
                "#
            }
        };

        let used = sqlx::query_scalar::<_, i32>(sql)
            .bind(org_id)
            .bind(period)
            .bind(limit)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to increment usage: {}", e))
            })?;

        timer.observe_duration();

        Ok(used)
    }

    /// Create the first counter of a period with one unit of `kind` consumed.
    ///
    /// Returns `None` when another request created the row first (unique
    /// violation on `(org_id, period)`); the caller retries as a guarded
    /// increment against the now-existing row.
    #[instrument(skip(self), fields(org_id = %org_id, period = %period, kind = %kind))]
    pub async fn insert_usage_counter(
        &self,
        org_id: Uuid,
        period: &str,
        kind: UsageKind,
    ) -> Result<Option<i32>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_usage_counter"])
            .start_timer();

        let (projects, publications, tasks) = match kind {
            UsageKind::Projects => (1, 0, 0),
            UsageKind::Publications => (0, 1, 0),
            UsageKind::Tasks => (0, 0, 1),
        };

        let counter_id = Uuid::new_v4();
        let result = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO usage_counters (counter_id, org_id, period, projects_used, publications_used, tasks_used)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING projects_used + publications_used + tasks_used
            "#,
        )
        .bind(counter_id)
        .bind(org_id)
        .bind(period)
        .bind(projects)
        .bind(publications)
        .bind(tasks)
        .fetch_one(&self.pool)
        .await;

        timer.observe_duration();

        match result {
            Ok(_) => Ok(Some(1)),
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => Ok(None),
            Err(e) => Err(AppError::DatabaseError(anyhow::anyhow!(
                "Failed to create usage counter: {}",
                e
            ))),
        }
    }

    // =========================================================================
    // Storage Usage Operations
    // =========================================================================

    /// Get an organization's storage usage row.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn get_storage_usage(&self, org_id: Uuid) -> Result<Option<StorageUsage>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_storage_usage"])
            .start_timer();

        let usage = sqlx::query_as::<_, StorageUsage>(
            r#"
            SELECT org_id, bytes_used, read_only, read_only_reason, updated_utc
            FROM storage_usage
            WHERE org_id = $1
            "#,
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get storage usage: {}", e)))?;

        timer.observe_duration();

        Ok(usage)
    }

    /// Apply a signed byte delta, clamping the stored total at zero.
    /// Creates the row lazily on first write.
    #[instrument(skip(self), fields(org_id = %org_id, delta = delta))]
    pub async fn add_storage_bytes(
        &self,
        org_id: Uuid,
        delta: i64,
    ) -> Result<StorageUsage, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_storage_bytes"])
            .start_timer();

        let usage = sqlx::query_as::<_, StorageUsage>(
            r#"
            INSERT INTO storage_usage (org_id, bytes_used)
            VALUES ($1, GREATEST($2, 0))
            ON CONFLICT (org_id) DO UPDATE
            SET bytes_used = GREATEST(0, storage_usage.bytes_used + $2),
                updated_utc = NOW()
            RETURNING org_id, bytes_used, read_only, read_only_reason, updated_utc
            "#,
        )
        .bind(org_id)
        .bind(delta)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to add storage bytes: {}", e)))?;

        timer.observe_duration();

        Ok(usage)
    }

    /// Set or clear the read-only flag on an organization's storage row.
    #[instrument(skip(self), fields(org_id = %org_id, read_only = read_only))]
    pub async fn set_storage_read_only(
        &self,
        org_id: Uuid,
        read_only: bool,
        reason: Option<&str>,
    ) -> Result<StorageUsage, AppError> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to acquire connection: {}", e))
        })?;
        self.set_storage_read_only_on(&mut conn, org_id, read_only, reason)
            .await
    }

    /// Connection-level variant of [`set_storage_read_only`], used inside
    /// the hourly charge transaction.
    pub async fn set_storage_read_only_on(
        &self,
        conn: &mut PgConnection,
        org_id: Uuid,
        read_only: bool,
        reason: Option<&str>,
    ) -> Result<StorageUsage, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_storage_read_only"])
            .start_timer();

        let usage = sqlx::query_as::<_, StorageUsage>(
            r#"
            INSERT INTO storage_usage (org_id, bytes_used, read_only, read_only_reason)
            VALUES ($1, 0, $2, $3)
            ON CONFLICT (org_id) DO UPDATE
            SET read_only = $2,
                read_only_reason = $3,
                updated_utc = NOW()
            RETURNING org_id, bytes_used, read_only, read_only_reason, updated_utc
            "#,
        )
        .bind(org_id)
        .bind(read_only)
        .bind(reason)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to set read-only flag: {}", e)))?;

        timer.observe_duration();

        Ok(usage)
    }

    // =========================================================================
    // Storage Billing Operations
    // =========================================================================

    /// Get the billing record for one charged hour, if present.
    #[instrument(skip(self), fields(org_id = %org_id, hour_key = %hour_key))]
    pub async fn get_storage_billing(
        &self,
        org_id: Uuid,
        hour_key: &str,
    ) -> Result<Option<StorageBillingRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_storage_billing"])
            .start_timer();

        let record = sqlx::query_as::<_, StorageBillingRecord>(
            r#"
            SELECT billing_id, org_id, period, hour_key, bytes_snapshot, gb_billed, amount, charged_utc
            FROM storage_billing
            WHERE org_id = $1 AND hour_key = $2
            "#,
        )
        .bind(org_id)
        .bind(hour_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get storage billing: {}", e)))?;

        timer.observe_duration();

        Ok(record)
    }

    /// Append one hour's billing record inside the charge transaction.
    ///
    /// Returns `None` on a unique violation for `(org_id, hour_key)` -
    /// a concurrent scheduler already charged this hour and the caller
    /// must roll the transaction back.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_storage_billing(
        &self,
        conn: &mut PgConnection,
        org_id: Uuid,
        period: &str,
        hour_key: &str,
        bytes_snapshot: i64,
        gb_billed: i32,
        amount: Decimal,
    ) -> Result<Option<StorageBillingRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_storage_billing"])
            .start_timer();

        let billing_id = Uuid::new_v4();
        let result = sqlx::query_as::<_, StorageBillingRecord>(
            r#"
            INSERT INTO storage_billing (billing_id, org_id, period, hour_key, bytes_snapshot, gb_billed, amount)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING billing_id, org_id, period, hour_key, bytes_snapshot, gb_billed, amount, charged_utc
            "#,
        )
        .bind(billing_id)
        .bind(org_id)
        .bind(period)
        .bind(hour_key)
        .bind(bytes_snapshot)
        .bind(gb_billed)
        .bind(amount)
        .fetch_one(&mut *conn)
        .await;

        timer.observe_duration();

        match result {
            Ok(record) => Ok(Some(record)),
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => Ok(None),
            Err(e) => Err(AppError::DatabaseError(anyhow::anyhow!(
                "Failed to insert storage billing: {}",
                e
            ))),
        }
    }

    // =========================================================================
    // Wallet Operations
    // =========================================================================

    /// Get a wallet by its owner (contractor or organization).
    #[instrument(skip(self), fields(owner_id = %owner_id))]
    pub async fn get_wallet_by_owner(&self, owner_id: Uuid) -> Result<Option<Wallet>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_wallet_by_owner"])
            .start_timer();

        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT wallet_id, owner_id, balance, bonus_balance, currency, created_utc, updated_utc
            FROM wallets
            WHERE owner_id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get wallet: {}", e)))?;

        timer.observe_duration();

        Ok(wallet)
    }

    /// Create a wallet seeded with the signup bonus, writing the matching
    /// ledger entry in the same transaction.
    ///
    /// Returns `None` when another request created the owner's wallet
    /// first; the caller re-reads instead of erroring.
    #[instrument(skip(self), fields(owner_id = %owner_id))]
    pub async fn create_wallet(
        &self,
        owner_id: Uuid,
        signup_bonus: Decimal,
        currency: &str,
    ) -> Result<Option<Wallet>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_wallet"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let wallet_id = Uuid::new_v4();
        let result = sqlx::query_as::<_, Wallet>(
            r#"
            INSERT INTO wallets (wallet_id, owner_id, balance, bonus_balance, currency)
            VALUES ($1, $2, 0, $3, $4)
            RETURNING wallet_id, owner_id, balance, bonus_balance, currency, created_utc, updated_utc
            "#,
        )
        .bind(wallet_id)
        .bind(owner_id)
        .bind(signup_bonus)
        .bind(currency)
        .fetch_one(&mut *tx)
        .await;

        let wallet = match result {
            Ok(wallet) => wallet,
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await.ok();
                timer.observe_duration();
                return Ok(None);
            }
            Err(e) => {
                return Err(AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to create wallet: {}",
                    e
                )));
            }
        };

        if signup_bonus > Decimal::ZERO {
            self.insert_wallet_transaction(
                &mut *tx,
                &NewWalletTransaction {
                    wallet_id: wallet.wallet_id,
                    amount: signup_bonus,
                    tx_type: crate::models::TxType::Credit,
                    source: crate::models::TxSource::SignupBonus,
                    balance_after: wallet.balance,
                    bonus_balance_after: wallet.bonus_balance,
                    meta: None,
                },
            )
            .await?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(wallet_id = %wallet.wallet_id, owner_id = %owner_id, "Wallet created");

        Ok(Some(wallet))
    }

    /// Fetch the freshest wallet state over an existing connection.
    pub async fn get_wallet_on(
        &self,
        conn: &mut PgConnection,
        wallet_id: Uuid,
    ) -> Result<Option<Wallet>, AppError> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT wallet_id, owner_id, balance, bonus_balance, currency, created_utc, updated_utc
            FROM wallets
            WHERE wallet_id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get wallet: {}", e)))?;

        Ok(wallet)
    }

    /// Guarded debit: subtract the bonus/balance split only while both
    /// floors still hold at write time.
    ///
    /// Returns `None` when no row matched - a concurrent debit won the
    /// race and the caller must report insufficient funds, never retry a
    /// partial charge.
    pub async fn try_debit_wallet(
        &self,
        conn: &mut PgConnection,
        wallet_id: Uuid,
        from_bonus: Decimal,
        from_balance: Decimal,
    ) -> Result<Option<Wallet>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["try_debit_wallet"])
            .start_timer();

        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            UPDATE wallets
            SET bonus_balance = bonus_balance - $2,
                balance = balance - $3,
                updated_utc = NOW()
            WHERE wallet_id = $1 AND bonus_balance >= $2 AND balance >= $3
            RETURNING wallet_id, owner_id, balance, bonus_balance, currency, created_utc, updated_utc
            "#,
        )
        .bind(wallet_id)
        .bind(from_bonus)
        .bind(from_balance)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to debit wallet: {}", e)))?;

        timer.observe_duration();

        Ok(wallet)
    }

    /// Credit a wallet's real balance.
    pub async fn credit_wallet_balance(
        &self,
        conn: &mut PgConnection,
        wallet_id: Uuid,
        amount: Decimal,
    ) -> Result<Option<Wallet>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["credit_wallet_balance"])
            .start_timer();

        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            UPDATE wallets
            SET balance = balance + $2, updated_utc = NOW()
            WHERE wallet_id = $1
            RETURNING wallet_id, owner_id, balance, bonus_balance, currency, created_utc, updated_utc
            "#,
        )
        .bind(wallet_id)
        .bind(amount)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to credit wallet: {}", e)))?;

        timer.observe_duration();

        Ok(wallet)
    }

    /// Append an immutable ledger entry.
    pub async fn insert_wallet_transaction(
        &self,
        conn: &mut PgConnection,
        input: &NewWalletTransaction,
    ) -> Result<WalletTransaction, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_wallet_transaction"])
            .start_timer();

        let transaction_id = Uuid::new_v4();
        let transaction = sqlx::query_as::<_, WalletTransaction>(
            r#"
            INSERT INTO wallet_transactions (transaction_id, wallet_id, amount, tx_type, source, balance_after, bonus_balance_after, meta)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING transaction_id, wallet_id, amount, tx_type, source, balance_after, bonus_balance_after, meta, created_utc
            "#,
        )
        .bind(transaction_id)
        .bind(input.wallet_id)
        .bind(input.amount)
        .bind(input.tx_type.as_str())
        .bind(input.source.as_str())
        .bind(input.balance_after)
        .bind(input.bonus_balance_after)
        .bind(&input.meta)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to insert wallet transaction: {}", e))
        })?;

        timer.observe_duration();

        Ok(transaction)
    }

    /// List a wallet's ledger entries, most recent first.
    #[instrument(skip(self), fields(wallet_id = %wallet_id))]
    pub async fn list_wallet_transactions(
        &self,
        wallet_id: Uuid,
        page_size: i32,
    ) -> Result<Vec<WalletTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_wallet_transactions"])
            .start_timer();

        let limit = page_size.clamp(1, 100) as i64;

        let transactions = sqlx::query_as::<_, WalletTransaction>(
            r#"
            SELECT transaction_id, wallet_id, amount, tx_type, source, balance_after, bonus_balance_after, meta, created_utc
            FROM wallet_transactions
            WHERE wallet_id = $1
            ORDER BY created_utc DESC
            LIMIT $2
            "#,
        )
        .bind(wallet_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list wallet transactions: {}", e))
        })?;

        timer.observe_duration();

        Ok(transactions)
    }
}
