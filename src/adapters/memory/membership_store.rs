use crate::domain::{Member, MemberId, MemberStatus};
use crate::ports::membership_store::{MembershipStore as MembershipStoreTrait, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::lock;

/// MembershipStoreのインメモリ実装
pub struct MembershipStore {
    members: Mutex<HashMap<MemberId, Member>>,
}

impl MembershipStore {
    pub fn new() -> Self {
        Self {
            members: Mutex::new(HashMap::new()),
        }
    }

    /// 会員を登録する（同じIDは上書き）
    pub fn add_member(&self, member: Member) -> Result<()> {
        lock(&self.members)?.insert(member.member_id, member);
        Ok(())
    }
}

impl Default for MembershipStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MembershipStoreTrait for MembershipStore {
    async fn get_member(&self, member_id: MemberId) -> Result<Option<Member>> {
        Ok(lock(&self.members)?.get(&member_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Member>> {
        Ok(lock(&self.members)?
            .values()
            .find(|member| member.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert_member(&self, member: &Member) -> Result<bool> {
        let mut members = lock(&self.members)?;
        let taken = members.contains_key(&member.member_id)
            || members
                .values()
                .any(|existing| existing.email.eq_ignore_ascii_case(&member.email));
        if taken {
            return Ok(false);
        }
        members.insert(member.member_id, member.clone());
        Ok(true)
    }

    async fn update_status(
        &self,
        member_id: MemberId,
        status: MemberStatus,
    ) -> Result<Option<Member>> {
        let mut members = lock(&self.members)?;
        Ok(members.get_mut(&member_id).map(|member| {
            member.status = status;
            member.clone()
        }))
    }
}
