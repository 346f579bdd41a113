//! ソースファイル管理
//!
//! 読み込んだソースファイルの内容と行テーブルを保持し、
//! バイトオフセットから行・列への変換を提供する。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Serialize;

/// ファイル識別子
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default, Serialize)]
pub struct FileId(u32);

impl FileId {
    /// 内部IDを取得（デバッグ用）
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// 内部IDから作成
    pub fn from_u32(id: u32) -> Self {
        Self(id)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// ファイル内の位置（1始まり、列はバイト単位）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileLocation {
    pub line: u32,
    pub column: u32,
}

impl FileLocation {
    /// 新しいファイル位置を作成
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// 読み込み済みソースファイル
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub contents: Rc<str>,
    /// 各行の先頭バイトオフセット
    line_starts: Vec<u32>,
}

impl SourceFile {
    /// 新しいソースファイルを作成
    pub fn new(path: PathBuf, contents: Rc<str>) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in contents.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Self {
            path,
            contents,
            line_starts,
        }
    }

    /// バイトオフセットを行・列に変換
    pub fn file_location(&self, offset: u32) -> FileLocation {
        let line_idx = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        FileLocation {
            line: line_idx as u32 + 1,
            column: offset - self.line_starts[line_idx] + 1,
        }
    }

    /// 行数
    pub fn num_lines(&self) -> usize {
        self.line_starts.len()
    }
}

/// ファイルレジストリ
///
/// 同じパスは同じ [`FileId`] になるが、内容は最後に登録したものが有効。
#[derive(Debug, Default, Clone)]
pub struct FileRegistry {
    files: Vec<SourceFile>,
    path_to_id: HashMap<PathBuf, FileId>,
}

impl FileRegistry {
    /// 新しいレジストリを作成
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            path_to_id: HashMap::new(),
        }
    }

    /// ファイルを登録してIDを返す
    pub fn register(&mut self, path: PathBuf, contents: Rc<str>) -> FileId {
        if let Some(&id) = self.path_to_id.get(&path) {
            self.files[id.index()] = SourceFile::new(path, contents);
            return id;
        }
        let id = FileId(self.files.len() as u32);
        self.path_to_id.insert(path.clone(), id);
        self.files.push(SourceFile::new(path, contents));
        id
    }

    /// IDからファイルを取得
    pub fn get(&self, id: FileId) -> &SourceFile {
        &self.files[id.index()]
    }

    /// IDからパスを取得
    pub fn get_path(&self, id: FileId) -> &Path {
        &self.files[id.index()].path
    }

    /// パスからIDを検索
    pub fn find(&self, path: &Path) -> Option<FileId> {
        self.path_to_id.get(path).copied()
    }

    /// 登録されているファイル数を返す
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// レジストリが空かどうか
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// 登録されたファイルをイテレート
    pub fn iter(&self) -> impl Iterator<Item = (FileId, &SourceFile)> {
        self.files
            .iter()
            .enumerate()
            .map(|(i, f)| (FileId(i as u32), f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_registry_register() {
        let mut registry = FileRegistry::new();
        let id1 = registry.register(PathBuf::from("/path/to/a.h"), Rc::from("int x;"));
        let id2 = registry.register(PathBuf::from("/path/to/b.h"), Rc::from("int y;"));

        assert_ne!(id1, id2);
        assert_eq!(registry.get_path(id1), Path::new("/path/to/a.h"));
        assert_eq!(&*registry.get(id2).contents, "int y;");
    }

    #[test]
    fn test_file_registry_same_path() {
        let mut registry = FileRegistry::new();
        let id1 = registry.register(PathBuf::from("a.h"), Rc::from("old"));
        let id2 = registry.register(PathBuf::from("a.h"), Rc::from("new"));

        assert_eq!(id1, id2);
        assert_eq!(registry.len(), 1);
        assert_eq!(&*registry.get(id1).contents, "new");
    }

    #[test]
    fn test_file_location() {
        let file = SourceFile::new(PathBuf::from("t.h"), Rc::from("ab\ncde\n\nf"));
        assert_eq!(file.file_location(0), FileLocation::new(1, 1));
        assert_eq!(file.file_location(2), FileLocation::new(1, 3));
        assert_eq!(file.file_location(3), FileLocation::new(2, 1));
        assert_eq!(file.file_location(5), FileLocation::new(2, 3));
        assert_eq!(file.file_location(7), FileLocation::new(3, 1));
        assert_eq!(file.file_location(8), FileLocation::new(4, 1));
        assert_eq!(file.num_lines(), 4);
    }
}
