use crate::domain::{Member, MemberId, MemberStatus};
use crate::ports::membership_store::{MembershipStore as MembershipStoreTrait, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use std::str::FromStr;

use super::{invalid_data, to_i32, to_u32};

fn map_row_to_member(row: &PgRow) -> Result<Member> {
    let status_str: &str = row.get("status");
    let status = MemberStatus::from_str(status_str).map_err(invalid_data)?;

    Ok(Member {
        member_id: MemberId::from_uuid(row.get("member_id")),
        name: row.get("name"),
        email: row.get("email"),
        status,
        max_books_allowed: to_u32(row.get("max_books_allowed"), "max_books_allowed")?,
    })
}

/// MembershipStoreのPostgreSQL実装
pub struct MembershipStore {
    pool: PgPool,
}

impl MembershipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 会員を登録する（同じIDは上書き）
    pub async fn save(&self, member: &Member) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO members (member_id, name, email, status, max_books_allowed)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (member_id)
            DO UPDATE SET
                name = EXCLUDED.name,
                email = EXCLUDED.email,
                status = EXCLUDED.status,
                max_books_allowed = EXCLUDED.max_books_allowed,
                updated_at = NOW()
            "#,
        )
        .bind(member.member_id.value())
        .bind(&member.name)
        .bind(&member.email)
        .bind(member.status.as_str())
        .bind(to_i32(member.max_books_allowed, "max_books_allowed")?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MembershipStoreTrait for MembershipStore {
    async fn get_member(&self, member_id: MemberId) -> Result<Option<Member>> {
        let row = sqlx::query(
            r#"
            SELECT member_id, name, email, status, max_books_allowed
            FROM members
            WHERE member_id = $1
            "#,
        )
        .bind(member_id.value())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row_to_member).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Member>> {
        let row = sqlx::query(
            r#"
            SELECT member_id, name, email, status, max_books_allowed
            FROM members
            WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row_to_member).transpose()
    }

    /// IDとメールアドレス（`LOWER(email)`の一意索引）の制約に掛かる行は挿入しない
    async fn insert_member(&self, member: &Member) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO members (member_id, name, email, status, max_books_allowed)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(member.member_id.value())
        .bind(&member.name)
        .bind(&member.email)
        .bind(member.status.as_str())
        .bind(to_i32(member.max_books_allowed, "max_books_allowed")?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_status(
        &self,
        member_id: MemberId,
        status: MemberStatus,
    ) -> Result<Option<Member>> {
        let row = sqlx::query(
            r#"
            UPDATE members
            SET status = $2, updated_at = NOW()
            WHERE member_id = $1
            RETURNING member_id, name, email, status, max_books_allowed
            "#,
        )
        .bind(member_id.value())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row_to_member).transpose()
    }
}
