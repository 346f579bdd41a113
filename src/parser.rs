//! C++パーサーの中核
//!
//! プリプロセッサから受け取ったトークンを再帰下降でパースする。
//! 文法規則ごとの処理は `parse_*` モジュールに分かれており、
//! ここではトークンキュー、投機的パース用のリストアポイント、
//! エラーの抑制、括弧の対応を使ったエラー回復を扱う。

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::error::{CompileError, ExpectedToken, ParseError};
use crate::grammar::TranslationUnit;
use crate::location::{LinearLoc, VisitedFiles};
use crate::preprocessor::Preprocessor;
use crate::supervisor::{ParseSupervisor, Supervisor};
use crate::token::{Token, TokenKind};

/// 外側のスコープが引き受けるトークン
pub(crate) mod accept {
    pub const OPEN_CURLY: u32 = 0x1;
    pub const CLOSE_CURLY: u32 = 0x2;
    pub const CLOSE_PAREN: u32 = 0x4;
    pub const CLOSE_SQUARE: u32 = 0x8;
    pub const CLOSE_ANGLE: u32 = 0x10;
}

/// C++パーサー
pub struct Parser<'a> {
    pub(crate) pp: Preprocessor<'a>,
    pub(crate) visor: Supervisor<'a>,
    include_callback: Option<&'a mut dyn FnMut(&str)>,

    restore_point_enabled: bool,
    token_queue: VecDeque<Token>,
    token_queue_pos: usize,

    /// 1 のときだけ `<` をテンプレート引数の開始とみなす
    pub pass_number: u32,

    raw_error_count: u32,
    reported_error_count: u32,
    pp_error_count: u32,
    pub(crate) mute_errors: bool,
    pub(crate) outer_accept_flags: u32,
}

impl<'a> Parser<'a> {
    /// 新しいパーサーを作成
    pub fn new(pp: Preprocessor<'a>, visor: &'a mut dyn ParseSupervisor) -> Self {
        Self {
            pp,
            visor: Supervisor::new(visor),
            include_callback: None,
            restore_point_enabled: false,
            token_queue: VecDeque::new(),
            token_queue_pos: 0,
            pass_number: 1,
            raw_error_count: 0,
            reported_error_count: 0,
            pp_error_count: 0,
            mute_errors: false,
            outer_accept_flags: 0,
        }
    }

    /// `#include` ディレクティブの受け取り先を設定する
    ///
    /// 設定しなければスーパーバイザーの `on_got_include` に渡る。
    pub fn with_include_callback(mut self, callback: &'a mut dyn FnMut(&str)) -> Self {
        self.include_callback = Some(callback);
        self
    }

    /// 抑制されたものも含めたパースエラーの数
    pub fn raw_error_count(&self) -> u32 {
        self.raw_error_count
    }

    /// スーパーバイザーに報告したパースエラーの数
    pub fn reported_error_count(&self) -> u32 {
        self.reported_error_count
    }

    /// スーパーバイザーに報告したプリプロセッサエラーの数
    pub fn pp_error_count(&self) -> u32 {
        self.pp_error_count
    }

    pub fn visited_files(&self) -> &VisitedFiles {
        self.pp.visited_files()
    }

    /// 翻訳単位全体をパースする
    pub fn parse_translation_unit(&mut self) -> TranslationUnit {
        let mut tu = TranslationUnit::default();
        self.visor
            .do_enter(crate::supervisor::ScopeRef::TranslationUnit(&tu));
        self.parse_declaration_list(false, "");
        let eof = self.read_token();
        debug_assert_eq!(eof.kind, TokenKind::EndOfFile);
        tu.visor_decls = self.visor.take_decls();
        self.visor
            .do_exit(crate::supervisor::ScopeRef::TranslationUnit(&tu));
        tu
    }

    // ==================== トークンキュー ====================

    /// プリプロセッサから次のトークンを取り出す
    ///
    /// コメント・ディレクティブ・マクロはここでスーパーバイザーへ回し、
    /// キューには入れない。
    fn read_pp_token(&mut self) -> Token {
        loop {
            let token = self.pp.read_token();
            self.drain_pp_events();
            if !token.kind.is_structural() {
                return token;
            }
            let args: &[Token] = if token.kind == TokenKind::Macro {
                self.pp.macro_args()
            } else {
                &[]
            };
            self.visor.visor.got_macro_or_comment(&token, args);
        }
    }

    /// プリプロセッサが溜めたエラーとインクルードを配送する
    fn drain_pp_events(&mut self) {
        for err in self.pp.take_errors() {
            self.pp_error_count += 1;
            debug!(kind = ?err.kind, linear_loc = err.linear_loc, "reporting preprocessor error");
            self.visor.visor.handle_error(CompileError::Preprocess(err));
        }
        for directive in self.pp.take_includes() {
            match self.include_callback.as_mut() {
                Some(callback) => (*callback)(&directive),
                None => self.visor.visor.on_got_include(&directive),
            }
        }
    }

    fn read_token_internal(&mut self) -> Token {
        if self.token_queue_pos < self.token_queue.len() {
            if self.restore_point_enabled {
                let token = self.token_queue[self.token_queue_pos].clone();
                self.token_queue_pos += 1;
                token
            } else {
                debug_assert_eq!(self.token_queue_pos, 0);
                self.token_queue.pop_front().unwrap_or_default()
            }
        } else {
            let token = self.read_pp_token();
            if self.restore_point_enabled {
                self.token_queue.push_back(token.clone());
                self.token_queue_pos += 1;
            }
            token
        }
    }

    /// 次のトークンを読む
    pub(crate) fn read_token(&mut self) -> Token {
        self.read_token_internal()
    }

    /// 直前に読んだトークンを戻す
    pub(crate) fn push_back_token(&mut self, token: Token) {
        if self.token_queue_pos > 0 {
            debug_assert!(
                self.token_queue[self.token_queue_pos - 1] == token,
                "pushed back token differs from the last one read"
            );
            self.token_queue_pos -= 1;
        } else {
            self.token_queue.push_front(token);
        }
    }

    /// 次のトークンを読まずに覗く
    pub(crate) fn peek_token(&mut self) -> Token {
        let token = self.read_token();
        self.push_back_token(token.clone());
        token
    }

    // ==================== エラー ====================

    /// パースエラーを記録する
    ///
    /// 抑制中、またはリストアポイントが有効な間はスーパーバイザーに報告しない。
    /// `begin_muting` が真なら、次に期待通りのトークンを読むまで抑制する。
    pub(crate) fn error(&mut self, begin_muting: bool, err: ParseError) {
        self.raw_error_count += 1;
        if !self.mute_errors && !self.restore_point_enabled {
            self.reported_error_count += 1;
            debug!(
                kind = ?err.kind,
                linear_loc = err.error_token.linear_loc,
                "reporting parse error"
            );
            self.visor.visor.handle_error(CompileError::Parse(err));
        }
        if begin_muting {
            self.mute_errors = true;
        }
    }

    pub(crate) fn stop_muting_errors(&mut self) {
        self.mute_errors = false;
    }

    // ==================== スコープとエラー回復 ====================

    /// 開き括弧に対応する受け入れフラグを設定して `f` を実行する
    pub(crate) fn with_accept_flags<R>(
        &mut self,
        open: TokenKind,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let prev_flags = self.outer_accept_flags;
        let prev_angles = self.pp.tokenize_close_angles_only;
        match open {
            TokenKind::OpenCurly => {
                self.outer_accept_flags = accept::CLOSE_CURLY;
                self.pp.tokenize_close_angles_only = false;
            }
            TokenKind::OpenParen => {
                self.outer_accept_flags =
                    (self.outer_accept_flags | accept::CLOSE_PAREN) & !accept::CLOSE_ANGLE;
                self.pp.tokenize_close_angles_only = false;
            }
            TokenKind::OpenAngle => {
                self.outer_accept_flags |= accept::CLOSE_ANGLE;
                self.pp.tokenize_close_angles_only = true;
            }
            TokenKind::OpenSquare => {
                self.outer_accept_flags =
                    (self.outer_accept_flags | accept::CLOSE_SQUARE) & !accept::CLOSE_ANGLE;
                self.pp.tokenize_close_angles_only = false;
            }
            _ => debug_assert!(false, "{:?} does not open a scope", open),
        }
        let result = f(self);
        self.outer_accept_flags = prev_flags;
        self.pp.tokenize_close_angles_only = prev_angles;
        result
    }

    /// 受け入れフラグに `extra` を足して `f` を実行する
    pub(crate) fn with_extra_accept_flags<R>(
        &mut self,
        extra: u32,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let prev_flags = self.outer_accept_flags;
        self.outer_accept_flags |= extra;
        let result = f(self);
        self.outer_accept_flags = prev_flags;
        result
    }

    /// `>>` を分割するモードを切り替えて `f` を実行する
    pub(crate) fn with_close_angles_only<R>(
        &mut self,
        enabled: bool,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let prev = self.pp.tokenize_close_angles_only;
        self.pp.tokenize_close_angles_only = enabled;
        let result = f(self);
        self.pp.tokenize_close_angles_only = prev;
        result
    }

    /// 外側のスコープが引き受けるトークンなら戻して偽を返す
    pub(crate) fn ok_to_stay_in_scope(&mut self, token: &Token) -> bool {
        let flag = match token.kind {
            TokenKind::OpenCurly => accept::OPEN_CURLY,
            TokenKind::CloseCurly => accept::CLOSE_CURLY,
            TokenKind::CloseParen => accept::CLOSE_PAREN,
            TokenKind::CloseAngle => accept::CLOSE_ANGLE,
            TokenKind::CloseSquare => accept::CLOSE_SQUARE,
            TokenKind::EndOfFile => return false,
            _ => return true,
        };
        if self.outer_accept_flags & flag != 0 {
            self.push_back_token(token.clone());
            return false;
        }
        true
    }

    /// 開き括弧に対応する閉じ括弧まで読み飛ばす
    ///
    /// 外側のスコープが引き受けるトークンに出会ったら、それを戻して
    /// `None` を返す。
    pub(crate) fn skip_any_scope(&mut self, open: &Token) -> Option<Token> {
        let close_kind = open.kind.close_of()?;
        self.with_accept_flags(open.kind, |p| loop {
            let token = p.read_token();
            if token.kind == close_kind {
                return Some(token);
            }
            if !p.ok_to_stay_in_scope(&token) {
                p.error(true, ParseError::unclosed(token, open.clone()));
                return None;
            }
            p.skip_nested_scope(&token);
        })
    }

    /// `token` が内側のスコープを開くなら、その終わりまで読み飛ばす
    fn skip_nested_scope(&mut self, token: &Token) -> Option<Token> {
        match token.kind {
            // テンプレート引数の中でなければ `<` は比較演算子かもしれない
            TokenKind::OpenAngle if self.pp.tokenize_close_angles_only => {
                self.skip_any_scope(token)
            }
            TokenKind::OpenCurly | TokenKind::OpenParen | TokenKind::OpenSquare => {
                self.skip_any_scope(token)
            }
            _ => None,
        }
    }

    /// 予期しないトークンを処理する
    ///
    /// 外側のスコープが引き受けるトークンなら戻して偽を返す。
    /// それ以外は消費し、括弧ならその内側も読み飛ばして真を返す。
    /// 読み飛ばした括弧の閉じトークンは `close` に書き込む。
    pub(crate) fn handle_unexpected_token(
        &mut self,
        token: &Token,
        close: Option<&mut Token>,
    ) -> bool {
        if !self.ok_to_stay_in_scope(token) {
            return false;
        }
        if let Some(found) = self.skip_nested_scope(token)
            && let Some(close) = close
        {
            *close = found;
        }
        true
    }

    /// `(` または `[` に対応する閉じ括弧を読む
    ///
    /// 見つからなければエラーを出して読み飛ばす。外側のスコープに
    /// 処理を任せるべきときは `None` を返す。
    pub(crate) fn close_scope(&mut self, open: &Token) -> Option<Token> {
        let close = self.read_token();
        if Some(close.kind) == open.kind.close_of() {
            return Some(close);
        }
        let expected = if open.kind == TokenKind::OpenSquare {
            ExpectedToken::CloseSquare
        } else {
            debug_assert_eq!(open.kind, TokenKind::OpenParen);
            ExpectedToken::CloseParen
        };
        self.error(true, ParseError::expected(expected, close.clone()));
        self.push_back_token(close);
        let found = self.skip_any_scope(open)?;
        self.stop_muting_errors();
        Some(found)
    }
}

/// 投機的パースの開始点
///
/// 有効な間に読んだトークンはキューに残り、`backtrack` で読み直せる。
/// 使い終わったら必ず `cancel` を呼ぶ。
#[derive(Debug, Clone, Copy)]
pub(crate) struct RestorePoint {
    was_enabled: bool,
    saved_queue_pos: usize,
    saved_error_count: u32,
    saved_mute_errors: bool,
}

impl RestorePoint {
    pub fn begin(parser: &mut Parser<'_>) -> Self {
        let rp = Self {
            was_enabled: parser.restore_point_enabled,
            saved_queue_pos: parser.token_queue_pos,
            saved_error_count: parser.raw_error_count,
            saved_mute_errors: parser.mute_errors,
        };
        parser.restore_point_enabled = true;
        rp
    }

    pub fn error_occurred(&self, parser: &Parser<'_>) -> bool {
        parser.raw_error_count != self.saved_error_count
    }

    /// 開始点まで読み戻す
    pub fn backtrack(&self, parser: &mut Parser<'_>) {
        trace!(
            from = parser.token_queue_pos,
            to = self.saved_queue_pos,
            "backtracking"
        );
        parser.token_queue_pos = self.saved_queue_pos;
        parser.raw_error_count = self.saved_error_count;
        parser.mute_errors = self.saved_mute_errors;
    }

    /// リストアポイントを終える。最も外側なら消費済みのトークンを捨てる
    pub fn cancel(self, parser: &mut Parser<'_>) {
        if self.was_enabled {
            return;
        }
        let consumed = parser.token_queue_pos;
        parser.token_queue.drain(..consumed);
        parser.token_queue_pos = 0;
        parser.restore_point_enabled = false;
    }
}

/// パース処理の前後でエラーやトークン消費があったかを調べる
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParseActivity {
    saved_error_count: u32,
    saved_token_loc: LinearLoc,
}

impl ParseActivity {
    pub fn begin(parser: &mut Parser<'_>) -> Self {
        let token = parser.peek_token();
        Self {
            saved_error_count: parser.raw_error_count,
            saved_token_loc: token.linear_loc,
        }
    }

    pub fn error_occurred(&self, parser: &Parser<'_>) -> bool {
        parser.raw_error_count != self.saved_error_count
    }

    pub fn any_tokens_consumed(&self, parser: &mut Parser<'_>) -> bool {
        parser.peek_token().linear_loc != self.saved_token_loc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessor::PPConfig;
    use crate::supervisor::CollectingSupervisor;

    fn with_parser<R>(src: &str, f: impl FnOnce(&mut Parser<'_>) -> R) -> (R, CollectingSupervisor) {
        let mut files = VisitedFiles::new();
        let mut visor = CollectingSupervisor::default();
        let result = {
            let mut pp = Preprocessor::new(&mut files, PPConfig::default());
            pp.push_source("test.h", src);
            let mut parser = Parser::new(pp, &mut visor);
            f(&mut parser)
        };
        (result, visor)
    }

    #[test]
    fn test_push_back_and_restore_point() {
        let (texts, _) = with_parser("a b c d", |p| {
            let a = p.read_token();
            p.push_back_token(a);
            let rp = RestorePoint::begin(p);
            let first = p.read_token();
            let second = p.read_token();
            rp.backtrack(p);
            rp.cancel(p);
            let replay: Vec<String> = (0..4).map(|_| p.read_token().text).collect();
            (first.text, second.text, replay)
        });
        assert_eq!(texts.0, "a");
        assert_eq!(texts.1, "b");
        assert_eq!(texts.2, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_errors_suppressed_under_restore_point() {
        let (counts, visor) = with_parser("x", |p| {
            let rp = RestorePoint::begin(p);
            let tok = p.read_token();
            p.error(false, ParseError::expected(ExpectedToken::Semicolon, tok));
            let failed = rp.error_occurred(p);
            rp.backtrack(p);
            rp.cancel(p);
            (failed, p.raw_error_count(), p.reported_error_count())
        });
        assert_eq!(counts, (true, 0, 0));
        assert!(visor.errors.is_empty());
    }

    #[test]
    fn test_muting() {
        let (reported, visor) = with_parser("x y", |p| {
            let x = p.read_token();
            p.error(true, ParseError::expected(ExpectedToken::Semicolon, x));
            let y = p.read_token();
            p.error(true, ParseError::expected(ExpectedToken::Semicolon, y.clone()));
            p.stop_muting_errors();
            p.error(false, ParseError::expected(ExpectedToken::Comma, y));
            p.reported_error_count()
        });
        assert_eq!(reported, 2);
        assert_eq!(visor.errors.len(), 2);
    }

    #[test]
    fn test_skip_any_scope_nested() {
        let (close, _) = with_parser("(a [b] {c} (d)) e", |p| {
            let open = p.read_token();
            let close = p.skip_any_scope(&open);
            (close.map(|t| t.linear_loc), p.read_token().text)
        });
        assert_eq!(close, (Some(14), "e".to_string()));
    }

    #[test]
    fn test_skip_any_scope_stops_at_outer_closer() {
        let (result, visor) = with_parser("{ f( a; }", |p| {
            let curly = p.read_token();
            p.with_accept_flags(curly.kind, |p| {
                let _callee = p.read_token();
                let open = p.read_token();
                debug_assert_eq!(open.kind, TokenKind::OpenParen);
                let skipped = p.skip_any_scope(&open);
                (skipped.is_none(), p.read_token().kind)
            })
        });
        assert_eq!(result, (true, TokenKind::CloseCurly));
        assert_eq!(visor.errors.len(), 1);
    }

    #[test]
    fn test_parse_activity_tracks_consumption() {
        let (flags, _) = with_parser("a b", |p| {
            let pa = ParseActivity::begin(p);
            let before = pa.any_tokens_consumed(p);
            p.read_token();
            (before, pa.any_tokens_consumed(p), pa.error_occurred(p))
        });
        assert_eq!(flags, (false, true, false));
    }

    #[test]
    fn test_comments_forwarded_once() {
        let (_, visor) = with_parser("a /* c */ b", |p| {
            let rp = RestorePoint::begin(p);
            p.read_token();
            p.read_token();
            rp.backtrack(p);
            rp.cancel(p);
            p.read_token();
            p.read_token();
        });
        assert_eq!(visor.comments.len(), 1);
    }
}
