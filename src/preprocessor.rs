//! プリプロセッサ（トークナイザー）
//!
//! ソーステキストを低レベルトークンに分解する。マクロ展開は
//! 入力スタックに展開テキストを積むことで行い、リニアロケーションの
//! 対応はロケーションマップに記録する。条件コンパイルは評価しない。

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::{PPErrorKind, PreprocessorError};
use crate::location::{
    ExpansionText, LinearLoc, LocationMapEntry, MacroExpansion, VisitedFiles,
};
use crate::source::FileId;
use crate::token::{Token, TokenKind};

/// 事前定義マクロ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessorDefinition {
    pub identifier: String,
    pub expansion: String,
    pub takes_args: bool,
}

impl PreprocessorDefinition {
    /// オブジェクト形式マクロ
    pub fn new(identifier: &str, expansion: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            expansion: expansion.to_string(),
            takes_args: false,
        }
    }

    /// 関数形式マクロ（引数は捨てられ、展開テキストはそのまま使われる）
    pub fn function_like(identifier: &str, expansion: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            expansion: expansion.to_string(),
            takes_args: true,
        }
    }
}

/// プリプロセッサ設定
#[derive(Debug, Clone)]
pub struct PPConfig {
    /// 事前定義マクロ
    pub predefined: Vec<PreprocessorDefinition>,
    /// `#define` / `#undef` をマクロ表に反映するか
    pub register_defines: bool,
    /// マクロ展開のデバッグ出力 (--debug-pp)
    pub debug_pp: bool,
}

impl Default for PPConfig {
    fn default() -> Self {
        Self {
            predefined: Vec::new(),
            register_defines: true,
            debug_pp: false,
        }
    }
}

/// 入力スタックの1フレーム（ファイルまたはマクロ展開）
#[derive(Debug)]
struct StackItem {
    include_chain_idx: u32,
    text: Rc<str>,
    /// チェーン内容の先頭
    start: usize,
    pos: usize,
    end: usize,
    /// 展開中のマクロ
    macro_idx: Option<u32>,
}

/// バイト単位の読み取りカーソル
struct Cursor<'t> {
    bytes: &'t [u8],
    pos: usize,
    end: usize,
}

impl Cursor<'_> {
    fn avail(&self) -> bool {
        self.pos < self.end
    }

    fn remaining(&self) -> usize {
        self.end - self.pos
    }

    fn peek(&self) -> u8 {
        self.bytes[self.pos]
    }

    fn peek_at(&self, n: usize) -> Option<u8> {
        if self.pos + n < self.end {
            Some(self.bytes[self.pos + n])
        } else {
            None
        }
    }

    fn next_is(&self, c: u8) -> bool {
        self.avail() && self.peek() == c
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    /// 改行まで（改行を含む）読み飛ばす
    fn skip_line(&mut self) {
        while self.avail() {
            let c = self.peek();
            self.advance();
            if c == b'\n' {
                break;
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while self.avail() && is_white(self.peek()) {
            self.advance();
        }
    }

    /// `*/` の直後まで読み進める。見つからなければ末尾で false
    fn scan_past_comment_end(&mut self) -> bool {
        while self.avail() {
            let c = self.peek();
            self.advance();
            if c == b'*' && self.next_is(b'/') {
                self.advance();
                return true;
            }
        }
        false
    }

    fn skip_digits(&mut self, radix: u32) {
        while self.avail() && (self.peek() as char).is_digit(radix) {
            self.advance();
        }
    }
}

fn is_white(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n')
}

/// 識別子の2文字目以降に使える文字（`$` と非ASCIIを含む）
fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c >= 0x80
}

fn is_valid_string_prefix(prefix: &str) -> bool {
    matches!(prefix, "L" | "u" | "U" | "u8")
}

fn is_raw_string_prefix(prefix: &str) -> bool {
    matches!(prefix, "R" | "LR" | "uR" | "UR" | "u8R")
}

/// プリプロセッサ
pub struct Preprocessor<'a> {
    visited_files: &'a mut VisitedFiles,
    stack: Vec<StackItem>,
    linear_loc_at_end_of_stack_top: LinearLoc,
    macros: HashMap<String, u32>,
    /// テンプレート引数の中では `>>` や `>=` を結合しない
    pub tokenize_close_angles_only: bool,
    at_start_of_line: bool,
    /// 直前に返した `Macro` トークンの引数
    macro_args: Vec<Token>,
    register_defines: bool,
    debug_pp: bool,
    errors: Vec<PreprocessorError>,
    includes: Vec<String>,
}

impl<'a> Preprocessor<'a> {
    /// 新しいプリプロセッサを作成
    pub fn new(visited_files: &'a mut VisitedFiles, config: PPConfig) -> Self {
        let mut pp = Self {
            visited_files,
            stack: Vec::new(),
            linear_loc_at_end_of_stack_top: 0,
            macros: HashMap::new(),
            tokenize_close_angles_only: false,
            at_start_of_line: true,
            macro_args: Vec::new(),
            register_defines: config.register_defines,
            debug_pp: config.debug_pp,
            errors: Vec::new(),
            includes: Vec::new(),
        };
        for def in &config.predefined {
            pp.add_definition(def);
        }
        pp
    }

    /// マクロを登録する（既存の同名マクロは上書き）
    pub fn add_definition(&mut self, def: &PreprocessorDefinition) {
        let idx = self.visited_files.add_macro_expansion(MacroExpansion::from_text(
            &def.identifier,
            &def.expansion,
            def.takes_args,
        ));
        self.macros.insert(def.identifier.clone(), idx);
    }

    /// マクロが定義されているか
    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// ソースを入力スタックに積む
    pub fn push_source(&mut self, path: impl Into<PathBuf>, contents: &str) -> u32 {
        let start = match self.stack.last() {
            Some(top) => self.linear_loc_at(top.end, top.pos),
            None => self.linear_loc_at_end_of_stack_top.max(0),
        };
        self.push_source_at(path, contents, start)
    }

    /// 指定したリニアロケーションから始まるソースとして積む
    pub fn push_source_at(
        &mut self,
        path: impl Into<PathBuf>,
        contents: &str,
        linear_loc: LinearLoc,
    ) -> u32 {
        let chain_idx = self.visited_files.add_source_file(path, contents);
        let (text, start, end) = self.visited_files.contents(chain_idx);
        self.visited_files.insert_location(LocationMapEntry {
            linear_loc,
            include_chain_idx: chain_idx,
            offset: 0,
        });
        self.linear_loc_at_end_of_stack_top = linear_loc + (end - start) as LinearLoc;
        self.stack.push(StackItem {
            include_chain_idx: chain_idx,
            text,
            start,
            pos: start,
            end,
            macro_idx: None,
        });
        self.at_start_of_line = true;
        chain_idx
    }

    pub fn visited_files(&self) -> &VisitedFiles {
        self.visited_files
    }

    /// 直前の `Macro` トークンの引数
    pub fn macro_args(&self) -> &[Token] {
        &self.macro_args
    }

    /// 溜まったエラーを取り出す
    pub fn take_errors(&mut self) -> Vec<PreprocessorError> {
        std::mem::take(&mut self.errors)
    }

    /// 溜まった `#include` ディレクティブを取り出す
    pub fn take_includes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.includes)
    }

    fn error(&mut self, err: PreprocessorError) {
        trace!(kind = ?err.kind, linear_loc = err.linear_loc, "preprocessor error");
        self.errors.push(err);
    }

    /// スタックトップの位置 `pos` のリニアロケーション
    fn linear_loc_at(&self, end: usize, pos: usize) -> LinearLoc {
        self.linear_loc_at_end_of_stack_top - (end - pos) as LinearLoc
    }

    fn pop_frame(&mut self) {
        self.stack.pop();
        if let Some(parent) = self.stack.last() {
            let entry = LocationMapEntry {
                linear_loc: self.linear_loc_at_end_of_stack_top,
                include_chain_idx: parent.include_chain_idx,
                offset: (parent.pos - parent.start) as u32,
            };
            let remaining = (parent.end - parent.pos) as LinearLoc;
            self.visited_files.insert_location(entry);
            self.linear_loc_at_end_of_stack_top += remaining;
        }
    }

    /// 次のトークンを読む
    pub fn read_token(&mut self) -> Token {
        loop {
            let Some(top) = self.stack.last() else {
                return Token::new(
                    self.linear_loc_at_end_of_stack_top,
                    TokenKind::EndOfFile,
                    "",
                );
            };
            if top.pos >= top.end {
                self.pop_frame();
                continue;
            }
            let text = top.text.clone();
            let mut cur = Cursor {
                bytes: text.as_bytes(),
                pos: top.pos,
                end: top.end,
            };
            let token_start = cur.pos;
            let linear_loc = self.linear_loc_at(cur.end, token_start);
            let was_at_start_of_line = self.at_start_of_line;
            self.at_start_of_line = false;

            let kind = self.scan(&mut cur, was_at_start_of_line);
            if let Some(top) = self.stack.last_mut() {
                top.pos = cur.pos;
            }
            let Some(kind) = kind else {
                continue;
            };
            let token_text = &text[token_start..cur.pos];
            if kind == TokenKind::Identifier {
                if let Some(token) = self.try_expand_macro(&text, token_start, linear_loc) {
                    return token;
                }
            }
            return Token::new(linear_loc, kind, token_text);
        }
    }

    /// 1トークン分を読み進めて種別を返す。トークンにならない場合は None
    fn scan(&mut self, cur: &mut Cursor<'_>, was_at_start_of_line: bool) -> Option<TokenKind> {
        let c = cur.peek();
        match c {
            b'\n' | b'\r' | b'\t' | b' ' => {
                self.at_start_of_line = was_at_start_of_line;
                while cur.avail() {
                    match cur.peek() {
                        b'\n' => self.at_start_of_line = true,
                        b'\r' | b'\t' | b' ' => {}
                        _ => break,
                    }
                    cur.advance();
                }
                None
            }
            b'#' => {
                if was_at_start_of_line {
                    self.read_directive(cur);
                    Some(TokenKind::Directive)
                } else {
                    let loc = self.linear_loc_at(cur.end, cur.pos);
                    self.error(PreprocessorError::new(
                        PPErrorKind::DirectiveNotAtStartOfLine,
                        loc,
                    ));
                    cur.advance();
                    None
                }
            }
            b'/' => {
                let start_loc = self.linear_loc_at(cur.end, cur.pos);
                cur.advance();
                if cur.next_is(b'/') {
                    cur.advance();
                    cur.skip_line();
                    self.at_start_of_line = true;
                    return Some(TokenKind::LineComment);
                }
                if cur.next_is(b'*') {
                    cur.advance();
                    if cur.scan_past_comment_end() {
                        return Some(TokenKind::CStyleComment);
                    }
                    let loc = self.linear_loc_at(cur.end, cur.pos);
                    self.error(PreprocessorError::with_other(
                        PPErrorKind::EOFInComment,
                        loc,
                        start_loc,
                    ));
                    return None;
                }
                if cur.next_is(b'=') {
                    cur.advance();
                    return Some(TokenKind::SlashEqual);
                }
                Some(TokenKind::ForwardSlash)
            }
            b'{' => single(cur, TokenKind::OpenCurly),
            b'}' => single(cur, TokenKind::CloseCurly),
            b';' => single(cur, TokenKind::Semicolon),
            b'(' => single(cur, TokenKind::OpenParen),
            b')' => single(cur, TokenKind::CloseParen),
            b'[' => single(cur, TokenKind::OpenSquare),
            b']' => single(cur, TokenKind::CloseSquare),
            b',' => single(cur, TokenKind::Comma),
            b'?' => single(cur, TokenKind::QuestionMark),
            b'%' => single(cur, TokenKind::Percent),
            b'~' => single(cur, TokenKind::Tilde),
            b'^' => single(cur, TokenKind::Caret),
            b'<' => {
                cur.advance();
                Some(follow(
                    cur,
                    TokenKind::OpenAngle,
                    &[(b'<', TokenKind::LeftShift), (b'=', TokenKind::LessThanOrEqual)],
                ))
            }
            b'>' => {
                cur.advance();
                if self.tokenize_close_angles_only {
                    return Some(TokenKind::CloseAngle);
                }
                Some(follow(
                    cur,
                    TokenKind::CloseAngle,
                    &[(b'>', TokenKind::RightShift), (b'=', TokenKind::GreaterThanOrEqual)],
                ))
            }
            b':' => {
                cur.advance();
                Some(follow(cur, TokenKind::SingleColon, &[(b':', TokenKind::DoubleColon)]))
            }
            b'=' => {
                cur.advance();
                Some(follow(cur, TokenKind::SingleEqual, &[(b'=', TokenKind::DoubleEqual)]))
            }
            b'*' => {
                cur.advance();
                Some(follow(cur, TokenKind::Star, &[(b'=', TokenKind::StarEqual)]))
            }
            b'&' => {
                cur.advance();
                Some(follow(
                    cur,
                    TokenKind::SingleAmpersand,
                    &[(b'&', TokenKind::DoubleAmpersand)],
                ))
            }
            b'|' => {
                cur.advance();
                Some(follow(
                    cur,
                    TokenKind::SingleVerticalBar,
                    &[(b'|', TokenKind::DoubleVerticalBar)],
                ))
            }
            b'+' => {
                cur.advance();
                Some(follow(
                    cur,
                    TokenKind::SinglePlus,
                    &[(b'+', TokenKind::DoublePlus), (b'=', TokenKind::PlusEqual)],
                ))
            }
            b'-' => {
                cur.advance();
                Some(follow(
                    cur,
                    TokenKind::SingleMinus,
                    &[
                        (b'-', TokenKind::DoubleMinus),
                        (b'=', TokenKind::MinusEqual),
                        (b'>', TokenKind::Arrow),
                    ],
                ))
            }
            b'!' => {
                cur.advance();
                Some(follow(cur, TokenKind::Bang, &[(b'=', TokenKind::NotEqual)]))
            }
            b'.' => {
                cur.advance();
                if cur.remaining() >= 2 && cur.peek() == b'.' && cur.peek_at(1) == Some(b'.') {
                    cur.pos += 2;
                    return Some(TokenKind::Ellipsis);
                }
                Some(TokenKind::Dot)
            }
            b'\'' | b'"' => {
                let begin = self.linear_loc_at(cur.end, cur.pos);
                cur.advance();
                if self.read_string_literal(cur, c, begin) {
                    Some(TokenKind::StringLiteral)
                } else {
                    None
                }
            }
            _ => self.read_identifier_or_literal(cur),
        }
    }

    fn read_directive(&mut self, cur: &mut Cursor<'_>) {
        debug_assert_eq!(cur.peek(), b'#');
        let directive_start = cur.pos;
        cur.advance();

        while cur.avail() && is_white(cur.peek()) {
            let c = cur.peek();
            cur.advance();
            if c == b'\n' {
                // 空ディレクティブ
                self.at_start_of_line = true;
                return;
            }
        }

        let name_start = cur.pos;
        while cur.avail() && (cur.peek().is_ascii_alphanumeric() || matches!(cur.peek(), b'_' | b'$'))
        {
            cur.advance();
        }
        let name = std::str::from_utf8(&cur.bytes[name_start..cur.pos]).unwrap_or("");
        trace!(directive = name, "preprocessor directive");

        match name {
            "" => {
                let loc = self.linear_loc_at(cur.end, cur.pos);
                self.error(PreprocessorError::new(PPErrorKind::InvalidDirective, loc));
                cur.skip_line();
            }
            "include" => {
                cur.skip_line();
                let text = String::from_utf8_lossy(&cur.bytes[directive_start..cur.pos]);
                self.includes.push(text.trim_end().to_string());
            }
            "undef" => {
                let args_start = cur.pos;
                cur.skip_line();
                if self.register_defines {
                    let rest = String::from_utf8_lossy(&cur.bytes[args_start..cur.pos]);
                    if let Some(name) = rest.split_whitespace().next() {
                        self.macros.remove(name);
                    }
                }
            }
            "pragma" | "if" | "else" | "elif" | "endif" | "ifdef" | "ifndef" | "error"
            | "import" => cur.skip_line(),
            "define" => {
                let body_start = cur.pos;
                let mut escaping = false;
                while cur.avail() {
                    let c = cur.peek();
                    cur.advance();
                    if c == b'\n' {
                        if !escaping {
                            break;
                        }
                    } else if c != b'\r' {
                        escaping = c == b'\\';
                    }
                }
                if self.register_defines {
                    self.register_define(cur.bytes, body_start, cur.pos);
                }
            }
            _ => {
                let loc = self.linear_loc_at(cur.end, name_start);
                self.error(PreprocessorError::new(PPErrorKind::InvalidDirective, loc));
                cur.skip_line();
            }
        }
        self.at_start_of_line = true;
    }

    /// `#define` の内容 `[from, to)` をマクロ表に登録する
    fn register_define(&mut self, bytes: &[u8], from: usize, to: usize) {
        let mut i = from;
        let skip_blank = |i: &mut usize| {
            while *i < to && matches!(bytes[*i], b' ' | b'\t') {
                *i += 1;
            }
        };
        skip_blank(&mut i);
        let name_start = i;
        while i < to && is_ident_char(bytes[i]) {
            i += 1;
        }
        if name_start == i {
            return;
        }
        let name = String::from_utf8_lossy(&bytes[name_start..i]).into_owned();

        let mut params = Vec::new();
        let mut takes_args = false;
        if i < to && bytes[i] == b'(' {
            takes_args = true;
            i += 1;
            loop {
                skip_blank(&mut i);
                if i >= to {
                    return;
                }
                if bytes[i] == b')' {
                    i += 1;
                    break;
                }
                let param_start = i;
                if bytes[i..to].starts_with(b"...") {
                    i += 3;
                } else {
                    while i < to && is_ident_char(bytes[i]) {
                        i += 1;
                    }
                }
                if param_start == i {
                    return;
                }
                params.push(String::from_utf8_lossy(&bytes[param_start..i]).into_owned());
                skip_blank(&mut i);
                if i < to && bytes[i] == b',' {
                    i += 1;
                }
            }
        }

        let mut body_start = i;
        let mut body_end = to;
        while body_start < body_end && is_white(bytes[body_start]) {
            body_start += 1;
        }
        while body_end > body_start && is_white(bytes[body_end - 1]) {
            body_end -= 1;
        }
        let body = &bytes[body_start..body_end];

        let file = self.current_file();
        let text = match file {
            Some(file) if !body.contains(&b'\\') => ExpansionText::FileRange {
                file,
                start: body_start as u32,
                end: body_end as u32,
            },
            _ => {
                let joined = String::from_utf8_lossy(body)
                    .replace("\\\r\n", " ")
                    .replace("\\\n", " ");
                ExpansionText::Text(Rc::from(joined.as_str()))
            }
        };
        if self.debug_pp {
            debug!(macro_name = %name, takes_args, params = ?params, "define");
        }
        let idx = self.visited_files.add_macro_expansion(MacroExpansion {
            name: name.clone(),
            text,
            takes_args,
            params,
        });
        self.macros.insert(name, idx);
    }

    /// スタックトップがファイルならそのID
    fn current_file(&self) -> Option<FileId> {
        let top = self.stack.last()?;
        let chain = &self.visited_files.include_chains[top.include_chain_idx as usize];
        if chain.is_macro_expansion {
            None
        } else {
            Some(FileId::from_u32(chain.file_or_exp_idx))
        }
    }

    fn read_string_literal(&mut self, cur: &mut Cursor<'_>, quote: u8, begin: LinearLoc) -> bool {
        loop {
            if !cur.avail() {
                let loc = self.linear_loc_at(cur.end, cur.pos);
                self.error(PreprocessorError::with_other(
                    PPErrorKind::EOFInStringLiteral,
                    loc,
                    begin,
                ));
                return false;
            }
            let c = cur.peek();
            cur.advance();
            if c == b'\\' {
                if !cur.avail() {
                    let loc = self.linear_loc_at(cur.end, cur.pos);
                    self.error(PreprocessorError::with_other(
                        PPErrorKind::EOFInStringLiteral,
                        loc,
                        begin,
                    ));
                    return false;
                }
                cur.advance();
            } else if c == quote {
                return true;
            }
        }
    }

    /// `R"delim( ... )delim"` を読む。カーソルは `"` の位置にある
    fn read_raw_string_literal(&mut self, cur: &mut Cursor<'_>, begin: LinearLoc) -> bool {
        debug_assert_eq!(cur.peek(), b'"');
        cur.advance();

        let delim_start = cur.pos;
        loop {
            if !cur.avail() {
                let loc = self.linear_loc_at(cur.end, cur.pos);
                self.error(PreprocessorError::with_other(
                    PPErrorKind::EOFInRawStringDelimiter,
                    loc,
                    begin,
                ));
                return false;
            }
            let c = cur.peek();
            if c == b'(' {
                break;
            }
            if is_white(c) || c == b')' || c == b'\\' {
                let loc = self.linear_loc_at(cur.end, cur.pos);
                self.error(PreprocessorError::with_other(
                    PPErrorKind::InvalidCharInRawStringDelimiter,
                    loc,
                    begin,
                ));
                return false;
            }
            cur.advance();
        }
        let delim = &cur.bytes[delim_start..cur.pos];
        cur.advance();

        loop {
            if !cur.avail() {
                let loc = self.linear_loc_at(cur.end, cur.pos);
                self.error(PreprocessorError::with_other(
                    PPErrorKind::EOFInStringLiteral,
                    loc,
                    begin,
                ));
                return false;
            }
            let c = cur.peek();
            cur.advance();
            if c != b')' {
                continue;
            }
            let tail = &cur.bytes[cur.pos..cur.end];
            if tail.len() > delim.len() && tail.starts_with(delim) && tail[delim.len()] == b'"' {
                cur.pos += delim.len() + 1;
                return true;
            }
        }
    }

    fn read_numeric_literal(cur: &mut Cursor<'_>) {
        let mut is_hex = false;
        if cur.next_is(b'0') {
            cur.advance();
            if cur.avail() && matches!(cur.peek(), b'x' | b'X') {
                cur.advance();
                cur.skip_digits(16);
                is_hex = true;
            }
        }
        if !is_hex {
            cur.skip_digits(10);
            if cur.next_is(b'.') {
                cur.advance();
                cur.skip_digits(10);
            }
            if cur.avail() && matches!(cur.peek(), b'e' | b'E') {
                let signed = matches!(cur.peek_at(1), Some(b'+') | Some(b'-'));
                let digit_at = if signed { 2 } else { 1 };
                if cur.peek_at(digit_at).is_some_and(|d| d.is_ascii_digit()) {
                    cur.pos += digit_at;
                    cur.skip_digits(10);
                }
            }
        }
        if cur.next_is(b'f') {
            cur.advance();
        } else {
            if cur.next_is(b'U') {
                cur.advance();
            }
            if cur.next_is(b'L') {
                cur.advance();
                if cur.next_is(b'L') {
                    cur.advance();
                }
            }
        }
    }

    fn read_identifier_or_literal(&mut self, cur: &mut Cursor<'_>) -> Option<TokenKind> {
        if cur.peek().is_ascii_digit() {
            Self::read_numeric_literal(cur);
            return Some(TokenKind::NumericLiteral);
        }

        let begin = self.linear_loc_at(cur.end, cur.pos);
        let start = cur.pos;
        while cur.avail() && is_ident_char(cur.peek()) {
            cur.advance();
        }
        if cur.pos == start {
            cur.advance();
            self.error(PreprocessorError::new(PPErrorKind::GarbageCharacters, begin));
            return None;
        }
        if !cur.avail() || !matches!(cur.peek(), b'"' | b'\'') {
            return Some(TokenKind::Identifier);
        }

        // 文字列・文字リテラルのプレフィックス
        let quote = cur.peek();
        let prefix = std::str::from_utf8(&cur.bytes[start..cur.pos]).unwrap_or("");
        if quote == b'"' && is_raw_string_prefix(prefix) {
            return if self.read_raw_string_literal(cur, begin) {
                Some(TokenKind::StringLiteral)
            } else {
                None
            };
        }
        if !is_valid_string_prefix(prefix) {
            self.error(PreprocessorError::new(
                PPErrorKind::InvalidStringLiteralPrefix,
                begin,
            ));
        }
        cur.advance();
        if self.read_string_literal(cur, quote, begin) {
            Some(TokenKind::StringLiteral)
        } else {
            None
        }
    }

    /// 識別子がマクロなら展開フレームを積み、`Macro` トークンを返す
    fn try_expand_macro(
        &mut self,
        text: &Rc<str>,
        ident_start: usize,
        linear_loc: LinearLoc,
    ) -> Option<Token> {
        let top = self.stack.last()?;
        let name = &text[ident_start..top.pos];
        let &exp_idx = self.macros.get(name)?;
        if self.stack.iter().any(|item| item.macro_idx == Some(exp_idx)) {
            // 展開中のマクロは再展開しない
            return None;
        }
        let parent_chain = top.include_chain_idx;
        let call_site_offset = (ident_start - top.start) as u32;
        let name = name.to_string();

        self.macro_args.clear();
        let exp = &self.visited_files.macro_expansions[exp_idx as usize];
        let takes_args = exp.takes_args;
        let has_params = !exp.params.is_empty();
        if takes_args {
            let after_ident = top.pos;
            match self.read_macro_arguments(text) {
                Some(args) => self.macro_args = args,
                None => {
                    if let Some(top) = self.stack.last_mut() {
                        if top.pos < top.end {
                            top.pos = after_ident;
                        }
                    }
                    return None;
                }
            }
        }

        let instance_text = if has_params {
            let exp = &self.visited_files.macro_expansions[exp_idx as usize];
            let body = self.visited_files.macro_text(exp_idx);
            Some(Rc::from(
                substitute_args(body, &exp.params, &self.macro_args).as_str(),
            ))
        } else {
            None
        };

        if self.debug_pp {
            debug!(
                macro_name = %name,
                linear_loc,
                num_args = self.macro_args.len(),
                "expanding macro"
            );
        }

        let chain_idx = self.visited_files.add_macro_chain(
            exp_idx,
            parent_chain,
            call_site_offset,
            instance_text,
        );
        let (contents, start, end) = self.visited_files.contents(chain_idx);
        self.linear_loc_at_end_of_stack_top = linear_loc + (end - start) as LinearLoc;
        self.visited_files.insert_location(LocationMapEntry {
            linear_loc,
            include_chain_idx: chain_idx,
            offset: 0,
        });
        self.stack.push(StackItem {
            include_chain_idx: chain_idx,
            text: contents,
            start,
            pos: start,
            end,
            macro_idx: Some(exp_idx),
        });
        Some(Token::new(linear_loc, TokenKind::Macro, name))
    }

    /// マクロ名の後の `( ... )` を読み、引数ごとの `MacroArgument` トークンを返す
    ///
    /// 括弧がなければ None（位置は呼び出し側が戻す）。終端前にファイルが
    /// 終わった場合はエラーを報告して None を返し、位置は末尾のままにする。
    fn read_macro_arguments(&mut self, text: &Rc<str>) -> Option<Vec<Token>> {
        let top = self.stack.last()?;
        let mut cur = Cursor {
            bytes: text.as_bytes(),
            pos: top.pos,
            end: top.end,
        };
        cur.skip_whitespace();
        if !cur.next_is(b'(') {
            return None;
        }
        let open_paren_loc = self.linear_loc_at(cur.end, cur.pos);
        cur.advance();
        let mut arg_start = cur.pos;
        let mut arg_start_loc = open_paren_loc + 1;
        let mut args = Vec::new();
        let mut nest_level = 1;

        let result = loop {
            if !cur.avail() {
                let loc = self.linear_loc_at(cur.end, cur.pos);
                self.error(PreprocessorError::with_other(
                    PPErrorKind::EOFInMacro,
                    loc,
                    open_paren_loc,
                ));
                break None;
            }
            let c = cur.peek();
            cur.advance();
            match c {
                b'/' => {
                    if !cur.avail() {
                        let loc = self.linear_loc_at(cur.end, cur.pos);
                        self.error(PreprocessorError::with_other(
                            PPErrorKind::EOFInMacro,
                            loc,
                            open_paren_loc,
                        ));
                        break None;
                    }
                    if cur.peek() == b'/' {
                        cur.advance();
                        cur.skip_line();
                    } else if cur.peek() == b'*' {
                        cur.advance();
                        if !cur.scan_past_comment_end() {
                            let loc = self.linear_loc_at(cur.end, cur.pos);
                            self.error(PreprocessorError::with_other(
                                PPErrorKind::EOFInComment,
                                loc,
                                open_paren_loc,
                            ));
                            break None;
                        }
                    }
                }
                b'"' | b'\'' => {
                    let begin = self.linear_loc_at(cur.end, cur.pos - 1);
                    if !self.read_string_literal(&mut cur, c, begin) {
                        break None;
                    }
                }
                b'(' => nest_level += 1,
                b')' => {
                    nest_level -= 1;
                    if nest_level <= 0 {
                        args.push(Token::new(
                            arg_start_loc,
                            TokenKind::MacroArgument,
                            &text[arg_start..cur.pos - 1],
                        ));
                        break Some(args);
                    }
                }
                b',' if nest_level == 1 => {
                    args.push(Token::new(
                        arg_start_loc,
                        TokenKind::MacroArgument,
                        &text[arg_start..cur.pos - 1],
                    ));
                    arg_start = cur.pos;
                    arg_start_loc = self.linear_loc_at(cur.end, cur.pos);
                }
                _ => {}
            }
        };
        if let Some(top) = self.stack.last_mut() {
            top.pos = cur.pos;
        }
        result
    }
}

fn single(cur: &mut Cursor<'_>, kind: TokenKind) -> Option<TokenKind> {
    cur.advance();
    Some(kind)
}

/// 次の1文字で決まる2文字トークンを選ぶ
fn follow(cur: &mut Cursor<'_>, base: TokenKind, pairs: &[(u8, TokenKind)]) -> TokenKind {
    if cur.avail() {
        let c = cur.peek();
        for &(next, kind) in pairs {
            if c == next {
                cur.advance();
                return kind;
            }
        }
    }
    base
}

/// 関数形式マクロの本体に実引数を埋め込む
///
/// `#param` は文字列化し、`##` の前後の空白は詰める。
fn substitute_args(body: &str, params: &[String], args: &[Token]) -> String {
    let arg_text = |name: &str| -> Option<String> {
        if name == "__VA_ARGS__" && params.last().is_some_and(|p| p == "...") {
            let first = params.len() - 1;
            let rest: Vec<&str> = args.iter().skip(first).map(|a| a.text.trim()).collect();
            return Some(rest.join(", "));
        }
        let idx = params.iter().position(|p| p == name && p != "...")?;
        Some(args.get(idx).map(|a| a.text.trim().to_string()).unwrap_or_default())
    };

    let bytes = body.as_bytes();
    let mut out = String::with_capacity(body.len());
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b'"' || c == b'\'' {
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i] != c {
                if bytes[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            i = (i + 1).min(bytes.len());
            out.push_str(&body[start..i]);
        } else if c == b'#' && bytes.get(i + 1) == Some(&b'#') {
            while out.ends_with([' ', '\t']) {
                out.pop();
            }
            i += 2;
            while i < bytes.len() && matches!(bytes[i], b' ' | b'\t') {
                i += 1;
            }
        } else if c == b'#' {
            let mut j = i + 1;
            while j < bytes.len() && matches!(bytes[j], b' ' | b'\t') {
                j += 1;
            }
            let name_start = j;
            while j < bytes.len() && is_ident_char(bytes[j]) {
                j += 1;
            }
            match arg_text(&body[name_start..j]) {
                Some(arg) => {
                    out.push('"');
                    out.push_str(&arg.replace('\\', "\\\\").replace('"', "\\\""));
                    out.push('"');
                    i = j;
                }
                None => {
                    out.push('#');
                    i += 1;
                }
            }
        } else if is_ident_char(c) && !c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && is_ident_char(bytes[i]) {
                i += 1;
            }
            let ident = &body[start..i];
            match arg_text(ident) {
                Some(arg) => out.push_str(&arg),
                None => out.push_str(ident),
            }
        } else if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && is_ident_char(bytes[i]) {
                i += 1;
            }
            out.push_str(&body[start..i]);
        } else {
            let start = i;
            i += 1;
            while i < bytes.len() && !body.is_char_boundary(i) {
                i += 1;
            }
            out.push_str(&body[start..i]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens_of(src: &str) -> (Vec<(TokenKind, String)>, Vec<PreprocessorError>) {
        let mut vf = VisitedFiles::new();
        let mut pp = Preprocessor::new(&mut vf, PPConfig::default());
        pp.push_source("test.h", src);
        let mut tokens = Vec::new();
        loop {
            let tok = pp.read_token();
            if tok.kind == TokenKind::EndOfFile {
                break;
            }
            tokens.push((tok.kind, tok.text));
        }
        let errors = pp.take_errors();
        (tokens, errors)
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokens_of(src).0.into_iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn test_greedy_punctuation() {
        assert_eq!(
            kinds("a<<=b->c...d"),
            vec![
                TokenKind::Identifier,
                TokenKind::LeftShift,
                TokenKind::SingleEqual,
                TokenKind::Identifier,
                TokenKind::Arrow,
                TokenKind::Identifier,
                TokenKind::Ellipsis,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn test_numeric_literals() {
        let (tokens, errors) = tokens_of("0x1fUL 3.5e-2f 10LL 0 1.");
        assert!(errors.is_empty());
        let texts: Vec<_> = tokens.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(texts, vec!["0x1fUL", "3.5e-2f", "10LL", "0", "1."]);
        assert!(tokens.iter().all(|(k, _)| *k == TokenKind::NumericLiteral));
    }

    #[test]
    fn test_raw_string() {
        let (tokens, errors) = tokens_of(r#"R"xy(a)"b)xy" z"#);
        assert!(errors.is_empty());
        assert_eq!(tokens[0], (TokenKind::StringLiteral, r#"R"xy(a)"b)xy""#.to_string()));
        assert_eq!(tokens[1].1, "z");
    }

    #[test]
    fn test_string_prefixes() {
        let (tokens, errors) = tokens_of(r#"u8"a" L'x' foo"b""#);
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1], (TokenKind::StringLiteral, "L'x'".to_string()));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, PPErrorKind::InvalidStringLiteralPrefix);
    }

    #[test]
    fn test_directive_not_at_start_of_line() {
        let (tokens, errors) = tokens_of("int # x");
        assert_eq!(tokens.len(), 2);
        assert_eq!(errors[0].kind, PPErrorKind::DirectiveNotAtStartOfLine);
    }

    #[test]
    fn test_invalid_directive() {
        let (tokens, errors) = tokens_of("#bogus stuff\nint");
        assert_eq!(tokens[0].0, TokenKind::Directive);
        assert_eq!(tokens[1].1, "int");
        assert_eq!(errors[0].kind, PPErrorKind::InvalidDirective);
        assert_eq!(errors[0].linear_loc, 1);
    }

    #[test]
    fn test_unterminated_comment() {
        let (_, errors) = tokens_of("a /* b");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, PPErrorKind::EOFInComment);
        assert_eq!(errors[0].other_loc, 2);
        assert_eq!(errors[0].linear_loc, 6);
    }

    #[test]
    fn test_garbage() {
        let (tokens, errors) = tokens_of("a @ b");
        assert_eq!(tokens.len(), 2);
        assert_eq!(errors[0].kind, PPErrorKind::GarbageCharacters);
    }

    #[test]
    fn test_substitute_args() {
        let params = vec!["a".to_string(), "b".to_string()];
        let args = vec![
            Token::new(0, TokenKind::MacroArgument, " x "),
            Token::new(0, TokenKind::MacroArgument, "y + 1"),
        ];
        assert_eq!(substitute_args("a * (b) + ab", &params, &args), "x * (y + 1) + ab");
        assert_eq!(substitute_args("#a \"a\"", &params, &args), "\"x\" \"a\"");
        assert_eq!(substitute_args("a ## b", &params, &args), "xy + 1");
    }

    #[test]
    fn test_variadic_substitution() {
        let params = vec!["fmt".to_string(), "...".to_string()];
        let args = vec![
            Token::new(0, TokenKind::MacroArgument, "f"),
            Token::new(0, TokenKind::MacroArgument, "1"),
            Token::new(0, TokenKind::MacroArgument, " 2"),
        ];
        assert_eq!(
            substitute_args("g(fmt, __VA_ARGS__)", &params, &args),
            "g(f, 1, 2)"
        );
    }
}
