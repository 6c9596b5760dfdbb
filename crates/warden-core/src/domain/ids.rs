//! Domain identifiers (strongly-typed IDs).
//!
//! ULID ベースの ID を Phantom type パターンで型付けしています。
//! `OwnerId` はロックを取得した実行単位（dispatch 1 回分）を、
//! `BatchId` は `dispatch_all` 1 回分を識別します。
//!
//! ## ULID の特性
//! - **分散生成可能**: 調整なしで複数ノードで生成できる（owner token に必要）
//! - **時刻でソート可能**: ログ上で取得順が追える

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"owner-", "batch-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData なので実行時のサイズは `Ulid` と同じです。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// Fresh id from the system clock. Prefer an `IdGenerator` where a clock is injected.
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Lock owner のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Owner {}

impl IdMarker for Owner {
    fn prefix() -> &'static str {
        "owner-"
    }
}

/// Batch のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Batch {}

impl IdMarker for Batch {
    fn prefix() -> &'static str {
        "batch-"
    }
}

/// Opaque token identifying the execution unit that holds a lease.
pub type OwnerId = Id<Owner>;

/// Identifier of one fan-out/fan-in call (log correlation only).
pub type BatchId = Id<Batch>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_render_with_their_prefix() {
        let ulid = Ulid::new();

        let owner = OwnerId::from_ulid(ulid);
        let batch = BatchId::from_ulid(ulid);

        assert_eq!(owner.as_ulid(), batch.as_ulid());
        assert_eq!(owner.to_string(), format!("owner-{ulid}"));
        assert_eq!(batch.to_string(), format!("batch-{ulid}"));
        // let _: OwnerId = batch; // <- does not compile
    }

    #[test]
    fn generated_owners_are_unique() {
        let a = OwnerId::generate();
        let b = OwnerId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn owner_id_serde_roundtrip() {
        let owner = OwnerId::generate();

        let s = serde_json::to_string(&owner).unwrap();
        let back: OwnerId = serde_json::from_str(&s).unwrap();

        assert_eq!(owner, back);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<OwnerId>(), size_of::<Ulid>());
        assert_eq!(size_of::<BatchId>(), 16);
    }
}
