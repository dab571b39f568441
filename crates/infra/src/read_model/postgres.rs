//! Postgres session binding for the tenant predicate.
//!
//! Row scoping in Postgres is done by row-level security policies reading the
//! `app.current_church_id` and `app.tenant_bypass` settings (see
//! `migrations/0001_church_rls.sql`). A transaction with neither setting sees
//! no rows. Settings are applied with `is_local = true`, so they belong to the
//! session's transaction and are gone once the transaction ends and the
//! connection returns to the pool.

use sqlx::{PgPool, Postgres, Row, Transaction};

use shepherd_core::{ChurchId, HouseholdId, MemberId};

use super::session::SessionScope;
use crate::records::Member;
use crate::tenant_filter::{TenantGateError, TenantPredicateSession};

pub const CHURCH_SETTING: &str = "app.current_church_id";
pub const BYPASS_SETTING: &str = "app.tenant_bypass";

pub const CHURCH_RLS_MIGRATION: &str = include_str!("../../migrations/0001_church_rls.sql");

/// Create the church-scoped tables and their row-level security policies.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(CHURCH_RLS_MIGRATION).execute(pool).await?;
    Ok(())
}

/// One request's transaction.
pub struct PgTenantSession {
    tx: Transaction<'static, Postgres>,
    scope: SessionScope,
}

impl PgTenantSession {
    pub async fn begin(pool: &PgPool) -> Result<Self, sqlx::Error> {
        Ok(Self {
            tx: pool.begin().await?,
            scope: SessionScope::Unbound,
        })
    }

    pub fn scope(&self) -> SessionScope {
        self.scope
    }

    pub fn predicate(&self) -> Option<ChurchId> {
        match self.scope {
            SessionScope::Scoped(church_id) => Some(church_id),
            _ => None,
        }
    }

    pub fn transaction(&mut self) -> &mut Transaction<'static, Postgres> {
        &mut self.tx
    }

    /// Value of the church setting as the database sees it.
    pub async fn current_church_setting(&mut self) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query("SELECT current_setting($1, true) AS church")
            .bind(CHURCH_SETTING)
            .fetch_one(&mut *self.tx)
            .await?;
        let value: Option<String> = row.try_get("church")?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    pub async fn list_members(&mut self) -> Result<Vec<Member>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, church_id, first_name, last_name, household_id
            FROM members
            ORDER BY id
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(member_from_row).collect()
    }

    pub async fn find_member(&mut self, id: MemberId) -> Result<Option<Member>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, church_id, first_name, last_name, household_id
            FROM members
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(member_from_row).transpose()
    }

    /// Row-level security rejects rows outside the session's church.
    pub async fn insert_member(&mut self, member: &Member) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO members (id, church_id, first_name, last_name, household_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(member.id.get())
        .bind(member.church_id.get())
        .bind(&member.first_name)
        .bind(&member.last_name)
        .bind(member.household_id.map(|h| h.get()))
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }
}

fn member_from_row(row: &sqlx::postgres::PgRow) -> Result<Member, sqlx::Error> {
    Ok(Member {
        id: MemberId::new(row.try_get("id")?),
        church_id: ChurchId::new(row.try_get("church_id")?),
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        household_id: row.try_get::<Option<i64>, _>("household_id")?.map(HouseholdId::new),
    })
}

async fn set_local(
    tx: &mut Transaction<'static, Postgres>,
    setting: &str,
    value: &str,
) -> Result<(), TenantGateError> {
    sqlx::query("SELECT set_config($1, $2, true)")
        .bind(setting)
        .bind(value)
        .execute(&mut **tx)
        .await
        .map_err(|e| TenantGateError::Session(e.to_string()))?;
    Ok(())
}

#[async_trait::async_trait]
impl TenantPredicateSession for PgTenantSession {
    async fn enable_tenant_predicate(&mut self, church_id: ChurchId) -> Result<(), TenantGateError> {
        match self.scope {
            SessionScope::Scoped(existing) if existing != church_id => {
                return Err(TenantGateError::Session(format!(
                    "session already scoped to church {existing}"
                )));
            }
            SessionScope::Bypassed => {
                return Err(TenantGateError::Session(
                    "session already bypasses the church predicate".into(),
                ));
            }
            _ => {}
        }
        set_local(&mut self.tx, CHURCH_SETTING, &church_id.to_string()).await?;
        self.scope = SessionScope::Scoped(church_id);
        Ok(())
    }

    async fn enable_bypass(&mut self) -> Result<(), TenantGateError> {
        if let SessionScope::Scoped(existing) = self.scope {
            return Err(TenantGateError::Session(format!(
                "session already scoped to church {existing}"
            )));
        }
        set_local(&mut self.tx, BYPASS_SETTING, "on").await?;
        self.scope = SessionScope::Bypassed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use shepherd_auth::{Role, TenantContext};

    use super::*;
    use crate::tenant_filter::{GateState, RouteAccess, activate};

    // Runs only against a live database. The role in DATABASE_URL must not be
    // a superuser, which would skip row-level security altogether.
    async fn pool() -> Option<PgPool> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = PgPool::connect(&url).await.ok()?;
        migrate(&pool).await.unwrap();
        Some(pool)
    }

    fn member(id: i64, church: ChurchId) -> Member {
        Member {
            id: MemberId::new(id),
            church_id: church,
            first_name: format!("First{id}"),
            last_name: "Rls".into(),
            household_id: None,
        }
    }

    fn superadmin() -> TenantContext {
        TenantContext::for_caller(None, &Role::SUPERADMIN)
    }

    #[tokio::test]
    async fn predicate_is_transaction_local() {
        let Some(pool) = pool().await else {
            return;
        };

        let mut session = PgTenantSession::begin(&pool).await.unwrap();
        let ctx = TenantContext::for_church(ChurchId::new(12));
        let state = activate(&ctx, &mut session, RouteAccess::Protected).await.unwrap();
        assert_eq!(state, GateState::Scoped(ChurchId::new(12)));
        assert_eq!(session.current_church_setting().await.unwrap().as_deref(), Some("12"));
        session.commit().await.unwrap();

        let mut next = PgTenantSession::begin(&pool).await.unwrap();
        assert_eq!(next.current_church_setting().await.unwrap(), None);
    }

    #[tokio::test]
    async fn rows_are_filtered_by_church_and_closed_when_unbound() {
        let Some(pool) = pool().await else {
            return;
        };

        // Two churches no other test uses.
        let base = chrono::Utc::now().timestamp_micros();
        let (a, b) = (ChurchId::new(base), ChurchId::new(base + 1));

        let mut seed = PgTenantSession::begin(&pool).await.unwrap();
        activate(&superadmin(), &mut seed, RouteAccess::Protected).await.unwrap();
        seed.insert_member(&member(base, a)).await.unwrap();
        seed.insert_member(&member(base + 1, b)).await.unwrap();
        seed.commit().await.unwrap();

        let mut scoped = PgTenantSession::begin(&pool).await.unwrap();
        activate(&TenantContext::for_church(a), &mut scoped, RouteAccess::Protected)
            .await
            .unwrap();
        let churches: Vec<ChurchId> = scoped.list_members().await.unwrap().iter().map(|m| m.church_id).collect();
        assert!(churches.contains(&a));
        assert!(churches.iter().all(|c| *c == a));
        assert!(scoped.find_member(MemberId::new(base + 1)).await.unwrap().is_none());
        assert!(scoped.insert_member(&member(base + 2, b)).await.is_err());
        drop(scoped);

        let mut unbound = PgTenantSession::begin(&pool).await.unwrap();
        assert!(unbound.list_members().await.unwrap().is_empty());
        drop(unbound);

        let mut cleanup = PgTenantSession::begin(&pool).await.unwrap();
        activate(&superadmin(), &mut cleanup, RouteAccess::Protected).await.unwrap();
        sqlx::query("DELETE FROM members WHERE church_id IN ($1, $2)")
            .bind(a.get())
            .bind(b.get())
            .execute(&mut **cleanup.transaction())
            .await
            .unwrap();
        cleanup.commit().await.unwrap();
    }
}
