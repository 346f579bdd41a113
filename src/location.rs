//! リニアロケーションとロケーションマップ
//!
//! プリプロセッサは全ファイルとマクロ展開を一本のバイト列として扱い、
//! その上の座標（リニアロケーション）をトークンに付与する。
//! ここではリニアロケーションをインクルードチェーン経由で
//! ファイル上の行・列へ戻すための表を管理する。

use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use crate::source::{FileId, FileLocation, FileRegistry, SourceFile};

/// トークン列全体を通したリニアな位置。負値は無効。
pub type LinearLoc = i64;

/// インクルードチェーン
///
/// ソースファイル、またはマクロ展開のどちらかを表す。
/// マクロ展開の場合は呼び出し元チェーンと、そのチェーン内での
/// 呼び出し位置（マクロ名の先頭バイト）を記録する。
#[derive(Debug, Clone)]
pub struct IncludeChain {
    pub is_macro_expansion: bool,
    /// `is_macro_expansion` に応じてファイルIDまたはマクロ展開のインデックス
    pub file_or_exp_idx: u32,
    pub parent_idx: Option<u32>,
    pub call_site_offset: u32,
    /// 引数置換済みの展開テキスト（関数形式マクロの呼び出しごと）
    pub instance_text: Option<Rc<str>>,
}

/// マクロ展開テキストの出どころ
#[derive(Debug, Clone)]
pub enum ExpansionText {
    /// 独立した文字列（事前定義マクロなど）
    Text(Rc<str>),
    /// ソースファイル内のバイト範囲（`#define` の本体）
    FileRange { file: FileId, start: u32, end: u32 },
}

/// マクロ定義
#[derive(Debug, Clone)]
pub struct MacroExpansion {
    pub name: String,
    pub text: ExpansionText,
    pub takes_args: bool,
    /// 仮引数名（`#define` で定義された関数形式マクロのみ）
    pub params: Vec<String>,
}

impl MacroExpansion {
    /// 文字列から作成
    pub fn from_text(name: &str, text: &str, takes_args: bool) -> Self {
        Self {
            name: name.to_string(),
            text: ExpansionText::Text(Rc::from(text)),
            takes_args,
            params: Vec::new(),
        }
    }
}

/// ロケーションマップの1エントリ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationMapEntry {
    pub linear_loc: LinearLoc,
    pub include_chain_idx: u32,
    /// チェーン内容の先頭からのバイトオフセット
    pub offset: u32,
}

/// 解決済みのファイル位置
#[derive(Debug, Clone, Copy)]
pub struct ExpandedFileLocation<'a> {
    pub file: &'a SourceFile,
    pub loc: FileLocation,
}

impl fmt::Display for ExpandedFileLocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}, {})",
            self.file.path.display(),
            self.loc.line,
            self.loc.column
        )
    }
}

/// パースセッションが訪れたファイル・マクロ展開の集約
#[derive(Debug, Default)]
pub struct VisitedFiles {
    pub files: FileRegistry,
    pub include_chains: Vec<IncludeChain>,
    pub macro_expansions: Vec<MacroExpansion>,
    location_map: Vec<LocationMapEntry>,
}

impl VisitedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// ソースファイルを登録し、そのファイルのインクルードチェーンを作る
    pub fn add_source_file(&mut self, path: impl Into<PathBuf>, contents: &str) -> u32 {
        let file = self.files.register(path.into(), Rc::from(contents));
        let idx = self.include_chains.len() as u32;
        self.include_chains.push(IncludeChain {
            is_macro_expansion: false,
            file_or_exp_idx: file.as_u32(),
            parent_idx: None,
            call_site_offset: 0,
            instance_text: None,
        });
        idx
    }

    /// マクロ定義を追加してインデックスを返す
    pub fn add_macro_expansion(&mut self, exp: MacroExpansion) -> u32 {
        let idx = self.macro_expansions.len() as u32;
        self.macro_expansions.push(exp);
        idx
    }

    /// マクロ展開用のインクルードチェーンを作る
    pub fn add_macro_chain(
        &mut self,
        exp_idx: u32,
        parent_idx: u32,
        call_site_offset: u32,
        instance_text: Option<Rc<str>>,
    ) -> u32 {
        let idx = self.include_chains.len() as u32;
        self.include_chains.push(IncludeChain {
            is_macro_expansion: true,
            file_or_exp_idx: exp_idx,
            parent_idx: Some(parent_idx),
            call_site_offset,
            instance_text,
        });
        idx
    }

    /// チェーンの内容を (共有バッファ, 開始, 終了) で返す
    pub fn contents(&self, chain_idx: u32) -> (Rc<str>, usize, usize) {
        let chain = &self.include_chains[chain_idx as usize];
        if let Some(text) = &chain.instance_text {
            return (text.clone(), 0, text.len());
        }
        if chain.is_macro_expansion {
            let exp = &self.macro_expansions[chain.file_or_exp_idx as usize];
            match &exp.text {
                ExpansionText::Text(text) => (text.clone(), 0, text.len()),
                ExpansionText::FileRange { file, start, end } => (
                    self.files.get(*file).contents.clone(),
                    *start as usize,
                    *end as usize,
                ),
            }
        } else {
            let file = &self.files.get(chain_file_id(chain)).contents;
            (file.clone(), 0, file.len())
        }
    }

    /// マクロ定義の本体テキスト
    pub fn macro_text(&self, exp_idx: u32) -> &str {
        match &self.macro_expansions[exp_idx as usize].text {
            ExpansionText::Text(text) => text,
            ExpansionText::FileRange { file, start, end } => {
                &self.files.get(*file).contents[*start as usize..*end as usize]
            }
        }
    }

    /// ロケーションマップにエントリを追加
    pub fn insert_location(&mut self, entry: LocationMapEntry) {
        debug_assert!(
            self.location_map
                .last()
                .is_none_or(|last| last.linear_loc <= entry.linear_loc),
            "location map entries must be appended in order"
        );
        self.location_map.push(entry);
    }

    /// `linear_loc` 以下で最後のエントリ
    pub fn find_entry(&self, linear_loc: LinearLoc) -> Option<&LocationMapEntry> {
        let n = self
            .location_map
            .partition_point(|e| e.linear_loc <= linear_loc);
        if n == 0 {
            None
        } else {
            Some(&self.location_map[n - 1])
        }
    }

    pub fn location_map(&self) -> &[LocationMapEntry] {
        &self.location_map
    }

    /// リニアロケーションをファイル上の位置に戻す
    ///
    /// マクロ展開内の位置は、展開を呼び出した位置へ辿って解決する。
    pub fn expand_file_location(&self, linear_loc: LinearLoc) -> Option<ExpandedFileLocation<'_>> {
        if linear_loc < 0 {
            return None;
        }
        let entry = self.find_entry(linear_loc)?;
        let mut chain = &self.include_chains[entry.include_chain_idx as usize];
        let mut offset = (linear_loc - entry.linear_loc) as u32 + entry.offset;
        while chain.is_macro_expansion {
            offset = chain.call_site_offset;
            chain = &self.include_chains[chain.parent_idx? as usize];
        }
        let file = self.files.get(chain_file_id(chain));
        Some(ExpandedFileLocation {
            file,
            loc: file.file_location(offset),
        })
    }

    /// 位置を包んでいるマクロ展開の名前（内側から順）
    pub fn expansion_trace(&self, linear_loc: LinearLoc) -> Vec<&str> {
        let mut names = Vec::new();
        let Some(entry) = self.find_entry(linear_loc) else {
            return names;
        };
        let mut chain = &self.include_chains[entry.include_chain_idx as usize];
        while chain.is_macro_expansion {
            names.push(
                self.macro_expansions[chain.file_or_exp_idx as usize]
                    .name
                    .as_str(),
            );
            match chain.parent_idx {
                Some(p) => chain = &self.include_chains[p as usize],
                None => break,
            }
        }
        names
    }
}

fn chain_file_id(chain: &IncludeChain) -> FileId {
    debug_assert!(!chain.is_macro_expansion);
    FileId::from_u32(chain.file_or_exp_idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_entry_latest_wins() {
        let mut vf = VisitedFiles::new();
        let chain = vf.add_source_file("a.h", "abc");
        vf.insert_location(LocationMapEntry {
            linear_loc: 0,
            include_chain_idx: chain,
            offset: 0,
        });
        vf.insert_location(LocationMapEntry {
            linear_loc: 5,
            include_chain_idx: chain,
            offset: 1,
        });
        vf.insert_location(LocationMapEntry {
            linear_loc: 5,
            include_chain_idx: chain,
            offset: 2,
        });
        assert_eq!(vf.find_entry(4).map(|e| e.offset), Some(0));
        assert_eq!(vf.find_entry(5).map(|e| e.offset), Some(2));
        assert_eq!(vf.find_entry(100).map(|e| e.offset), Some(2));
        assert!(vf.find_entry(-1).is_none());
    }

    #[test]
    fn test_expand_through_macro_chain() {
        let mut vf = VisitedFiles::new();
        let file_chain = vf.add_source_file("m.h", "int\n  FOO;");
        let exp = vf.add_macro_expansion(MacroExpansion::from_text("FOO", "x", false));
        let macro_chain = vf.add_macro_chain(exp, file_chain, 6, None);
        vf.insert_location(LocationMapEntry {
            linear_loc: 0,
            include_chain_idx: file_chain,
            offset: 0,
        });
        vf.insert_location(LocationMapEntry {
            linear_loc: 6,
            include_chain_idx: macro_chain,
            offset: 0,
        });

        let loc = vf.expand_file_location(6).unwrap();
        assert_eq!(loc.loc, FileLocation::new(2, 3));
        assert_eq!(loc.to_string(), "m.h(2, 3)");
        assert_eq!(vf.expansion_trace(6), vec!["FOO"]);
        assert!(vf.expansion_trace(0).is_empty());
    }

    #[test]
    fn test_contents_of_file_range_macro() {
        let mut vf = VisitedFiles::new();
        vf.add_source_file("d.h", "#define A 42\n");
        let exp = vf.add_macro_expansion(MacroExpansion {
            name: "A".into(),
            text: ExpansionText::FileRange {
                file: FileId::from_u32(0),
                start: 10,
                end: 12,
            },
            takes_args: false,
            params: Vec::new(),
        });
        let chain = vf.add_macro_chain(exp, 0, 0, None);
        let (text, start, end) = vf.contents(chain);
        assert_eq!(&text[start..end], "42");
    }
}
