//! App - アプリケーション層
//!
//! ports・pool・dispatch を組み合わせて submission interface を提供します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: コーディネータ・Pool・Dispatcher のワイヤリング
//! - **App**: keys → outcome メッセージ列

pub mod builder;

pub use self::builder::{App, AppBuilder, BuildError};
