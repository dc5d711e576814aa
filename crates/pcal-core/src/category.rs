//! # Ten-God Categories
//!
//! The fixed set of ten categorical counts carried by every record. The
//! single [`TenGod`] enum is the only definition in the workspace; every
//! `match` on it is exhaustive, and every fixed-size count or weight array is
//! indexed through [`TenGod::index`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PcalError;

/// One of the ten relational categories of a chart.
///
/// Serialized in `snake_case` pinyin. Parsing additionally accepts the
/// Chinese name and is case-insensitive for the pinyin form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenGod {
    /// 比肩: peer.
    #[serde(alias = "比肩")]
    BiJian,
    /// 劫财: rob wealth.
    #[serde(alias = "劫财")]
    JieCai,
    /// 食神: eating god.
    #[serde(alias = "食神")]
    ShiShen,
    /// 伤官: hurting officer.
    #[serde(alias = "伤官")]
    ShangGuan,
    /// 偏财: indirect wealth.
    #[serde(alias = "偏财")]
    PianCai,
    /// 正财: direct wealth.
    #[serde(alias = "正财")]
    ZhengCai,
    /// 七杀: seven killings.
    #[serde(alias = "七杀")]
    QiSha,
    /// 正官: direct officer.
    #[serde(alias = "正官")]
    ZhengGuan,
    /// 偏印: indirect resource.
    #[serde(alias = "偏印")]
    PianYin,
    /// 正印: direct resource.
    #[serde(alias = "正印")]
    ZhengYin,
}

impl TenGod {
    /// Number of categories. Fixed.
    pub const COUNT: usize = 10;

    /// All categories in canonical (index) order.
    pub fn all() -> &'static [TenGod; Self::COUNT] {
        &[
            Self::BiJian,
            Self::JieCai,
            Self::ShiShen,
            Self::ShangGuan,
            Self::PianCai,
            Self::ZhengCai,
            Self::QiSha,
            Self::ZhengGuan,
            Self::PianYin,
            Self::ZhengYin,
        ]
    }

    /// Row index of this category in count vectors and weight matrices.
    pub fn index(self) -> usize {
        match self {
            Self::BiJian => 0,
            Self::JieCai => 1,
            Self::ShiShen => 2,
            Self::ShangGuan => 3,
            Self::PianCai => 4,
            Self::ZhengCai => 5,
            Self::QiSha => 6,
            Self::ZhengGuan => 7,
            Self::PianYin => 8,
            Self::ZhengYin => 9,
        }
    }

    /// Canonical serialized name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BiJian => "bi_jian",
            Self::JieCai => "jie_cai",
            Self::ShiShen => "shi_shen",
            Self::ShangGuan => "shang_guan",
            Self::PianCai => "pian_cai",
            Self::ZhengCai => "zheng_cai",
            Self::QiSha => "qi_sha",
            Self::ZhengGuan => "zheng_guan",
            Self::PianYin => "pian_yin",
            Self::ZhengYin => "zheng_yin",
        }
    }

    /// Chinese name as it appears in source datasets.
    pub fn chinese(self) -> &'static str {
        match self {
            Self::BiJian => "比肩",
            Self::JieCai => "劫财",
            Self::ShiShen => "食神",
            Self::ShangGuan => "伤官",
            Self::PianCai => "偏财",
            Self::ZhengCai => "正财",
            Self::QiSha => "七杀",
            Self::ZhengGuan => "正官",
            Self::PianYin => "偏印",
            Self::ZhengYin => "正印",
        }
    }

    /// Resolve a category from its pinyin or Chinese name.
    ///
    /// Returns `None` for unknown names; record parsing ignores those keys.
    pub fn lookup(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        Self::all().iter().copied().find(|g| {
            g.chinese() == trimmed || g.as_str().eq_ignore_ascii_case(trimmed)
        })
    }
}

impl fmt::Display for TenGod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenGod {
    type Err = PcalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s).ok_or_else(|| PcalError::UnknownCategory(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_cover_zero_to_nine_in_order() {
        for (i, g) in TenGod::all().iter().enumerate() {
            assert_eq!(g.index(), i);
        }
    }

    #[test]
    fn lookup_accepts_pinyin_and_chinese() {
        assert_eq!(TenGod::lookup("zheng_guan"), Some(TenGod::ZhengGuan));
        assert_eq!(TenGod::lookup("ZHENG_GUAN"), Some(TenGod::ZhengGuan));
        assert_eq!(TenGod::lookup("正官"), Some(TenGod::ZhengGuan));
        assert_eq!(TenGod::lookup(" 七杀 "), Some(TenGod::QiSha));
        assert_eq!(TenGod::lookup("day_master"), None);
    }

    #[test]
    fn from_str_rejects_unknown() {
        let err = "nope".parse::<TenGod>().unwrap_err();
        assert!(matches!(err, PcalError::UnknownCategory(ref s) if s == "nope"));
    }

    #[test]
    fn serde_uses_snake_case_and_accepts_chinese_alias() {
        let json = serde_json::to_string(&TenGod::ShangGuan).unwrap();
        assert_eq!(json, "\"shang_guan\"");
        let back: TenGod = serde_json::from_str("\"伤官\"").unwrap();
        assert_eq!(back, TenGod::ShangGuan);
    }
}
