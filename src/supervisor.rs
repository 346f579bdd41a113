//! パーススーパーバイザー（ビジター）
//!
//! パーサーはスコープの出入りや宣言の完成をスーパーバイザーに通知する。
//! スコープスタックはパース中のみ存在し、完全修飾名の計算や
//! 宣言を正しい親へ振り分けるために使う。

use crate::error::CompileError;
use crate::grammar::{
    Declaration, EnumSpecifier, InitEnumeratorWithComma, Linkage, Namespace, Record, Simple,
    Template, TranslationUnit,
};
use crate::token::Token;

/// 現在入っているスコープのノード
#[derive(Debug, Clone, Copy)]
pub enum ScopeRef<'a> {
    TranslationUnit(&'a TranslationUnit),
    Namespace(&'a Namespace),
    Record(&'a Record),
    Enum(&'a EnumSpecifier),
    Linkage(&'a Linkage),
    Template(&'a Template),
    /// 本体を持つ関数の宣言
    FunctionBody(&'a Simple),
}

/// スコープスタックに積む情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeKind {
    TranslationUnit,
    Namespace { name: String },
    Record { name: String },
    Enum { name: String },
    Linkage,
    Template,
    FunctionBody,
}

impl ScopeKind {
    fn of(node: &ScopeRef<'_>) -> Self {
        match node {
            ScopeRef::TranslationUnit(_) => ScopeKind::TranslationUnit,
            ScopeRef::Namespace(ns) => ScopeKind::Namespace {
                name: ns.qid.get_class_name().to_string(),
            },
            ScopeRef::Record(rec) => ScopeKind::Record {
                name: rec.qid.get_class_name().to_string(),
            },
            ScopeRef::Enum(en) => ScopeKind::Enum {
                name: en.qid.get_class_name().to_string(),
            },
            ScopeRef::Linkage(_) => ScopeKind::Linkage,
            ScopeRef::Template(_) => ScopeKind::Template,
            ScopeRef::FunctionBody(_) => ScopeKind::FunctionBody,
        }
    }

    fn same_variant(&self, other: &ScopeKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

#[derive(Debug)]
struct ScopeFrame {
    kind: ScopeKind,
    decls: Vec<Declaration>,
}

/// スコープスタック
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<ScopeFrame>,
}

impl ScopeStack {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn top(&self) -> Option<&ScopeKind> {
        self.frames.last().map(|f| &f.kind)
    }

    /// 外側から順に
    pub fn iter(&self) -> impl Iterator<Item = &ScopeKind> {
        self.frames.iter().map(|f| &f.kind)
    }

    /// 囲んでいるクラス名を `sep` で連結して返す
    pub fn get_class_name(&self, sep: &str, with_namespace: bool) -> String {
        debug_assert!(matches!(self.top_level(), Some(ScopeKind::TranslationUnit)));
        let mut parts: Vec<&str> = Vec::new();
        for kind in self.iter().skip(1) {
            match kind {
                ScopeKind::Namespace { name } if with_namespace => parts.push(name),
                ScopeKind::Record { name } | ScopeKind::Enum { name } => parts.push(name),
                _ => {}
            }
        }
        parts.join(sep)
    }

    /// 先頭から連続する名前空間を `A::B::` の形で返す
    pub fn get_namespace_prefix(&self) -> String {
        let mut out = String::new();
        for kind in self.iter().skip(1) {
            let ScopeKind::Namespace { name } = kind else {
                break;
            };
            out.push_str(name);
            out.push_str("::");
        }
        out
    }

    fn top_level(&self) -> Option<&ScopeKind> {
        self.frames.first().map(|f| &f.kind)
    }
}

/// パースイベントを受け取るビジター
///
/// すべてのフックは既定で何もしない。
pub trait ParseSupervisor {
    /// スコープに入った直後（スタックには既に積まれている）
    fn enter(&mut self, _node: ScopeRef<'_>, _scopes: &ScopeStack) {}

    /// スコープを出る直前（スタックからはまだ降ろされていない）
    fn exit(&mut self, _node: ScopeRef<'_>, _scopes: &ScopeStack) {}

    /// 宣言が完成した
    fn on_got_declaration(&mut self, _decl: &Declaration, _scopes: &ScopeStack) {}

    fn on_got_enumerator(&mut self, _enumerator: &InitEnumeratorWithComma) {}

    /// コメント・ディレクティブ・マクロ。マクロなら引数も渡される
    fn got_macro_or_comment(&mut self, _token: &Token, _macro_args: &[Token]) {}

    /// `#include` ディレクティブの全文
    fn on_got_include(&mut self, _directive: &str) {}

    /// エラーの報告。戻り値は今のところ使わない
    fn handle_error(&mut self, _err: CompileError) -> bool {
        false
    }
}

/// 何もしないスーパーバイザー
#[derive(Debug, Default)]
pub struct NullSupervisor;

impl ParseSupervisor for NullSupervisor {}

/// イベントを記録するスーパーバイザー
#[derive(Debug, Default)]
pub struct CollectingSupervisor {
    pub errors: Vec<CompileError>,
    pub includes: Vec<String>,
    pub comments: Vec<Token>,
    /// マクロ名と引数の綴り
    pub macros: Vec<(String, Vec<String>)>,
    pub enumerators: Vec<String>,
    /// 入ったクラス・列挙型の完全修飾名
    pub entered_classes: Vec<String>,
    pub num_declarations: usize,
}

impl ParseSupervisor for CollectingSupervisor {
    fn enter(&mut self, node: ScopeRef<'_>, scopes: &ScopeStack) {
        if matches!(node, ScopeRef::Record(_) | ScopeRef::Enum(_)) {
            self.entered_classes.push(scopes.get_class_name("::", true));
        }
    }

    fn on_got_declaration(&mut self, _decl: &Declaration, _scopes: &ScopeStack) {
        self.num_declarations += 1;
    }

    fn on_got_enumerator(&mut self, enumerator: &InitEnumeratorWithComma) {
        self.enumerators.push(enumerator.identifier.text.clone());
    }

    fn got_macro_or_comment(&mut self, token: &Token, macro_args: &[Token]) {
        use crate::token::TokenKind;
        match token.kind {
            TokenKind::Macro => self.macros.push((
                token.text.clone(),
                macro_args.iter().map(|a| a.text.clone()).collect(),
            )),
            TokenKind::LineComment | TokenKind::CStyleComment => {
                self.comments.push(token.clone())
            }
            _ => {}
        }
    }

    fn on_got_include(&mut self, directive: &str) {
        self.includes.push(directive.to_string());
    }

    fn handle_error(&mut self, err: CompileError) -> bool {
        self.errors.push(err);
        true
    }
}

/// パーサー側でスコープスタックとビジターをまとめたもの
pub(crate) struct Supervisor<'v> {
    pub scopes: ScopeStack,
    pub visor: &'v mut dyn ParseSupervisor,
}

impl<'v> Supervisor<'v> {
    pub fn new(visor: &'v mut dyn ParseSupervisor) -> Self {
        Self {
            scopes: ScopeStack::default(),
            visor,
        }
    }

    pub fn do_enter(&mut self, node: ScopeRef<'_>) {
        self.scopes.frames.push(ScopeFrame {
            kind: ScopeKind::of(&node),
            decls: Vec::new(),
        });
        self.visor.enter(node, &self.scopes);
    }

    /// スコープで集めた宣言を取り出す（`do_exit` の前に呼ぶ）
    pub fn take_decls(&mut self) -> Vec<Declaration> {
        match self.scopes.frames.last_mut() {
            Some(frame) => std::mem::take(&mut frame.decls),
            None => Vec::new(),
        }
    }

    pub fn do_exit(&mut self, node: ScopeRef<'_>) {
        let kind = ScopeKind::of(&node);
        assert!(
            self.scopes
                .frames
                .last()
                .is_some_and(|f| f.kind.same_variant(&kind)),
            "do_exit does not match the innermost do_enter"
        );
        self.visor.exit(node, &self.scopes);
        self.scopes.frames.pop();
    }

    /// 宣言を現在のスコープに追加する
    pub fn got_declaration(&mut self, decl: Declaration) {
        self.visor.on_got_declaration(&decl, &self.scopes);
        let Some(frame) = self.scopes.frames.last_mut() else {
            return;
        };
        match frame.kind {
            ScopeKind::Template => {
                debug_assert!(frame.decls.is_empty(), "template already has a declaration");
                frame.decls.clear();
                frame.decls.push(decl);
            }
            ScopeKind::Enum { .. } | ScopeKind::FunctionBody => {
                debug_assert!(false, "declarations are not collected in this scope");
            }
            _ => frame.decls.push(decl),
        }
    }
}

/// 元ソースへの差し込み
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice {
    /// 元ソースのバイトオフセット
    pub offset: u32,
    pub text: String,
}

/// 差し込みを適用したソースを返す。同じ位置の差し込みは与えた順に並ぶ
pub fn apply_splices(source: &str, splices: &[Splice]) -> String {
    let mut sorted: Vec<&Splice> = splices.iter().collect();
    sorted.sort_by_key(|s| s.offset);
    let mut out = String::with_capacity(source.len());
    let mut last = 0usize;
    for splice in sorted {
        let ofs = (splice.offset as usize).min(source.len());
        if ofs < last || !source.is_char_boundary(ofs) {
            continue;
        }
        out.push_str(&source[last..ofs]);
        out.push_str(&splice.text);
        last = ofs;
    }
    out.push_str(&source[last..]);
    out
}
