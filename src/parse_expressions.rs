//! 式のパース
//!
//! 式は評価も木の構築もせず、どこからどこまでが式かだけを決める。
//! 初期化子や配列サイズ、デフォルト引数で使われる範囲を認識できればよい。

use crate::error::{ExpectedToken, ParseError};
use crate::grammar::{Expression, ParamDeclarationList, Simple};
use crate::parse_specifiers::SpecDcorMode;
use crate::parser::Parser;
use crate::token::{Token, TokenKind};

impl Parser<'_> {
    /// `Foo<...>::Bar` のような型名の続きを読み飛ばす
    fn consume_specifier(&mut self) {
        loop {
            let mut token = self.read_token();
            if token.kind == TokenKind::OpenAngle {
                self.with_close_angles_only(true, |p| p.skip_any_scope(&token));
                token = self.read_token();
            }
            if token.kind != TokenKind::DoubleColon {
                self.push_back_token(token);
                return;
            }
            let spec = self.read_token();
            if spec.kind != TokenKind::Identifier {
                self.error(
                    true,
                    ParseError::expected(ExpectedToken::Identifier, spec.clone()),
                );
                self.push_back_token(spec);
                return;
            }
        }
    }

    /// ラムダ式のキャプチャリスト。今のところ空のものだけ受け付ける
    fn parse_capture_list(&mut self) {
        let token = self.read_token();
        if token.kind != TokenKind::CloseSquare {
            self.error(
                true,
                ParseError::expected(ExpectedToken::CloseSquare, token),
            );
        }
    }

    /// `open` の直後から、カンマ区切りの式の並びを閉じ括弧まで読む
    fn parse_expression_list(&mut self, open: TokenKind) -> Token {
        let (close_kind, expected) = match open {
            TokenKind::OpenParen => (TokenKind::CloseParen, ExpectedToken::CommaOrCloseParen),
            _ => (TokenKind::CloseCurly, ExpectedToken::CommaOrCloseCurly),
        };
        let mut end = Token::default();
        loop {
            let token = self.read_token();
            if token.kind == close_kind {
                return token;
            }
            self.push_back_token(token);
            self.parse_expression(false);
            let sep = self.read_token();
            if sep.kind == TokenKind::Comma {
                continue;
            }
            if sep.kind == close_kind {
                return sep;
            }
            self.error(true, ParseError::expected(expected, sep.clone()));
            if !self.handle_unexpected_token(&sep, None) {
                return end;
            }
            end = sep;
        }
    }

    /// 式を1つ読み、その最初と最後のトークンを返す
    ///
    /// 式が始まらないとき、`optional` なら何も読まずに無効なトークンの組を返す。
    /// そうでなければエラーを出す。
    pub(crate) fn parse_expression(&mut self, optional: bool) -> (Token, Token) {
        let start = self.read_token();
        let mut end = match start.kind {
            TokenKind::Identifier => {
                self.consume_specifier();
                let next = self.read_token();
                match next.kind {
                    TokenKind::OpenParen => self
                        .with_accept_flags(TokenKind::OpenParen, |p| {
                            p.parse_expression_list(TokenKind::OpenParen)
                        }),
                    TokenKind::OpenCurly => self
                        .with_accept_flags(TokenKind::OpenCurly, |p| {
                            p.parse_expression_list(TokenKind::OpenCurly)
                        }),
                    _ => {
                        self.push_back_token(next);
                        start.clone()
                    }
                }
            }
            TokenKind::NumericLiteral => start.clone(),
            TokenKind::StringLiteral => {
                // 隣接する文字列リテラルは連結される
                let mut end = start.clone();
                loop {
                    let token = self.read_token();
                    if token.kind != TokenKind::StringLiteral {
                        self.push_back_token(token);
                        break;
                    }
                    end = token;
                }
                end
            }
            TokenKind::OpenParen => self.with_accept_flags(TokenKind::OpenParen, |p| {
                p.parse_expression(false);
                let close = p.read_token();
                if close.kind == TokenKind::CloseParen {
                    // Cスタイルのキャストとみなす
                    let (cast_operand, operand_end) = p.parse_expression(true);
                    if cast_operand.is_valid() { operand_end } else { close }
                } else {
                    p.push_back_token(close);
                    p.close_scope(&start).unwrap_or_default()
                }
            }),
            TokenKind::OpenCurly => self.parse_expression_list(TokenKind::OpenCurly),
            TokenKind::Bang | TokenKind::SingleAmpersand | TokenKind::SingleMinus => {
                self.parse_expression(false).1
            }
            TokenKind::OpenSquare => self.parse_lambda_expression(),
            _ => {
                if !optional {
                    self.error(
                        true,
                        ParseError::expected(ExpectedToken::Expression, start.clone()),
                    );
                }
                self.push_back_token(start);
                return (Token::default(), Token::default());
            }
        };

        let token = self.read_token();
        match token.kind {
            // テンプレート引数の中の `>` は式の終わり
            TokenKind::CloseAngle if self.pp.tokenize_close_angles_only => {
                self.push_back_token(token);
            }
            TokenKind::CloseAngle
            | TokenKind::SingleVerticalBar
            | TokenKind::DoubleVerticalBar
            | TokenKind::SingleAmpersand
            | TokenKind::DoubleAmpersand
            | TokenKind::DoubleEqual
            | TokenKind::NotEqual
            | TokenKind::OpenAngle
            | TokenKind::LessThanOrEqual
            | TokenKind::GreaterThanOrEqual
            | TokenKind::LeftShift
            | TokenKind::RightShift
            | TokenKind::SinglePlus
            | TokenKind::SingleMinus
            | TokenKind::Percent
            | TokenKind::Caret
            | TokenKind::Arrow
            | TokenKind::Star
            | TokenKind::Dot
            | TokenKind::ForwardSlash => {
                let (rhs_start, rhs_end) = self.parse_expression(false);
                if rhs_start.is_valid() {
                    end = rhs_end;
                }
            }
            TokenKind::QuestionMark => {
                self.parse_expression(false);
                let colon = self.read_token();
                if colon.kind != TokenKind::SingleColon {
                    self.error(true, ParseError::expected(ExpectedToken::Colon, colon.clone()));
                    self.push_back_token(colon);
                } else {
                    let (rhs_start, rhs_end) = self.parse_expression(false);
                    if rhs_start.is_valid() {
                        end = rhs_end;
                    }
                }
            }
            _ => self.push_back_token(token),
        }
        (start, end)
    }

    /// `[` の直後からラムダ式を読み、本体の閉じ括弧を返す
    fn parse_lambda_expression(&mut self) -> Token {
        self.parse_capture_list();
        let open_paren = self.peek_token();
        if open_paren.kind == TokenKind::OpenParen {
            let mut unused = ParamDeclarationList::default();
            self.parse_parameter_declaration_list(&mut unused, false);
        } else {
            self.error(
                true,
                ParseError::expected(ExpectedToken::OpenParen, open_paren),
            );
        }
        let mut token = self.read_token();
        if token.kind == TokenKind::Arrow {
            let mut ret_type = Simple::default();
            self.parse_specifiers_and_declarators(&mut ret_type, &SpecDcorMode::TypeID);
            token = self.read_token();
        }
        if token.kind != TokenKind::OpenCurly {
            self.error(
                true,
                ParseError::expected(ExpectedToken::OpenCurly, token.clone()),
            );
            self.push_back_token(token);
            return Token::default();
        }
        self.skip_any_scope(&token).unwrap_or_default()
    }
}

/// 式の範囲から構文木の式を作る
pub(crate) fn expression_from_range(start: Token, end: Token) -> Expression {
    if start.is_valid() {
        Expression::Range { start, end }
    } else {
        Expression::Empty
    }
}
