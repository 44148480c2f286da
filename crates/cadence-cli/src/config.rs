//! 設定の読み込み
//!
//! 優先順位: 既定値 < TOML ファイル < `CADENCE_*` 環境変数。
//! 入れ子のキーは `__` で区切る（例: `CADENCE_WORKER__CONCURRENCY=8`）。

use std::path::Path;

use cadence_core::app::EngineConfig;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};

pub fn load(path: &Path) -> Result<EngineConfig, figment::Error> {
    Figment::from(Serialized::defaults(EngineConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CADENCE_").split("__"))
        .extract()
}
