//! 宣言のパース
//!
//! 宣言リストは先頭のキーワードで分岐する。`extern`, アクセス指定子,
//! `static_assert`, `namespace`, `template`, `using` 以外はすべて
//! 単純宣言として読む。

use tracing::trace;

use crate::error::{ExpectedToken, ParseError, ParseErrorKind};
use crate::grammar::{
    Declaration, EnumSpecifier, ExpressionCall, InitEnumeratorWithComma, Linkage, Namespace,
    Simple, Template,
};
use crate::parse_qualified_id::ParseQualifiedMode;
use crate::parse_specifiers::{SpecDcorMode, is_type_declaration};
use crate::parser::{ParseActivity, Parser, RestorePoint};
use crate::supervisor::ScopeRef;
use crate::token::{Token, TokenKind};

impl Parser<'_> {
    /// `;` を読む。なければエラーを出して無効なトークンを返す
    fn parse_required_semicolon(&mut self) -> Token {
        let token = self.read_token();
        if token.kind == TokenKind::Semicolon {
            self.stop_muting_errors();
            return token;
        }
        self.error(
            true,
            ParseError::expected(ExpectedToken::Semicolon, token.clone()),
        );
        self.push_back_token(token);
        Token::default()
    }

    /// 列挙子の並び（`{` の直後から `}` まで）
    pub(crate) fn parse_enum_body(&mut self, en: &mut EnumSpecifier) {
        self.stop_muting_errors();
        self.with_accept_flags(TokenKind::OpenCurly, |p| loop {
            let token = p.read_token();
            match token.kind {
                TokenKind::CloseCurly => {
                    p.stop_muting_errors();
                    en.close_curly = token;
                    return;
                }
                TokenKind::Identifier => {
                    p.stop_muting_errors();
                    let mut enumerator = InitEnumeratorWithComma {
                        init: p.parse_optional_variable_initializer(false),
                        identifier: token,
                        comma: Token::default(),
                    };
                    let token2 = p.read_token();
                    let mut done = false;
                    match token2.kind {
                        TokenKind::Comma => {
                            p.stop_muting_errors();
                            enumerator.comma = token2;
                        }
                        TokenKind::CloseCurly => {
                            p.stop_muting_errors();
                            en.close_curly = token2;
                            done = true;
                        }
                        _ => {
                            // 識別子以外は次の周回でエラーになる
                            if token2.kind == TokenKind::Identifier {
                                p.error(
                                    true,
                                    ParseError::new(
                                        ParseErrorKind::MissingCommaAfterEnumerator,
                                        token2.clone(),
                                    )
                                    .after(enumerator.identifier.clone()),
                                );
                            }
                            p.push_back_token(token2);
                        }
                    }
                    p.visor.visor.on_got_enumerator(&enumerator);
                    en.enumerators.push(enumerator);
                    if done {
                        return;
                    }
                }
                _ => {
                    p.error(
                        true,
                        ParseError::expected(ExpectedToken::EnumeratorOrCloseCurly, token.clone()),
                    );
                    if !p.handle_unexpected_token(&token, None) {
                        return;
                    }
                }
            }
        })
    }

    /// 単純宣言を読み、スーパーバイザーに渡す
    fn parse_simple_declaration(&mut self, enclosing_class_name: &str) {
        let start_token = self.peek_token();
        let pa = ParseActivity::begin(self);
        let mut simple = Simple::default();
        self.parse_specifiers_and_declarators(
            &mut simple,
            &SpecDcorMode::GlobalOrMember(enclosing_class_name),
        );
        if !pa.error_occurred(self) {
            self.stop_muting_errors();
            if simple.init_declarators.is_empty() && !is_type_declaration(&simple) {
                self.error(
                    false,
                    ParseError::new(ParseErrorKind::MissingDeclaration, start_token),
                );
            }
        }

        // 関数本体で終わる宣言には `;` が要らない
        let requires_semicolon = !simple
            .init_declarators
            .last()
            .is_some_and(|last| last.init.is_function_body());
        if requires_semicolon {
            simple.semicolon = self.parse_required_semicolon();
        }
        self.visor.got_declaration(Declaration::Simple(simple));
    }

    /// `extern` で始まる宣言。`extern "C" { ... }` ならリンケージブロック
    fn parse_extern_declaration(&mut self, extern_token: Token, enclosing_class_name: &str) {
        self.push_back_token(extern_token);
        let rp = RestorePoint::begin(self);
        let extern_token = self.read_token();
        let literal = self.read_token();
        if literal.kind == TokenKind::StringLiteral {
            let open_curly = self.read_token();
            if open_curly.kind == TokenKind::OpenCurly {
                rp.cancel(self);
                let mut linkage = Linkage {
                    extern_token,
                    literal,
                    open_curly,
                    ..Default::default()
                };
                self.visor.do_enter(ScopeRef::Linkage(&linkage));
                linkage.close_curly = self.parse_declaration_list(true, "");
                linkage.visor_decls = self.visor.take_decls();
                self.visor.do_exit(ScopeRef::Linkage(&linkage));
                self.visor.got_declaration(Declaration::Linkage(linkage));
                return;
            }
        }
        // `extern "C" void f();` や `extern int x;` は単純宣言の指定子として読む
        rp.backtrack(self);
        rp.cancel(self);
        self.parse_simple_declaration(enclosing_class_name);
    }

    fn parse_namespace(&mut self, keyword: Token) {
        let mut ns = Namespace {
            keyword,
            ..Default::default()
        };
        let mut token = self.read_token();
        if token.kind == TokenKind::Identifier {
            self.push_back_token(token);
            ns.qid = self.parse_qualified_id(ParseQualifiedMode::RequireComplete);
            token = self.read_token();
        }

        if token.kind == TokenKind::OpenCurly {
            ns.open_curly = token;
            self.visor.do_enter(ScopeRef::Namespace(&ns));
            ns.close_curly = self.parse_declaration_list(true, "");
            ns.visor_decls = self.visor.take_decls();
            self.visor.do_exit(ScopeRef::Namespace(&ns));
        } else {
            self.error(
                true,
                ParseError::expected(ExpectedToken::OpenCurly, token.clone()),
            );
            self.push_back_token(token);
        }
        self.visor.got_declaration(Declaration::Namespace(ns));
    }

    fn parse_template(&mut self, keyword: Token, enclosing_class_name: &str) {
        let mut tmpl = Template {
            keyword,
            ..Default::default()
        };
        let open = self.peek_token();
        if open.kind == TokenKind::OpenAngle {
            self.with_close_angles_only(true, |p| {
                p.parse_parameter_declaration_list(&mut tmpl.params, true)
            });
        }
        self.visor.do_enter(ScopeRef::Template(&tmpl));
        self.parse_declaration(enclosing_class_name);
        tmpl.visor_decl = self.visor.take_decls().into_iter().next().map(Box::new);
        self.visor.do_exit(ScopeRef::Template(&tmpl));
        self.visor.got_declaration(Declaration::Template(tmpl));
    }

    /// `using namespace X;` または `using Name = type;`
    fn parse_using(&mut self, using: Token) {
        let token2 = self.read_token();
        if token2.is_ident("namespace") {
            let qid = self.parse_qualified_id(ParseQualifiedMode::RequireComplete);
            let semicolon = self.parse_required_semicolon();
            self.visor.got_declaration(Declaration::UsingDirective {
                using,
                namespace: token2,
                qid,
                semicolon,
            });
            return;
        }

        let equals = self.read_token();
        if equals.kind != TokenKind::SingleEqual {
            self.error(
                true,
                ParseError::expected(ExpectedToken::Equal, equals.clone()).after(token2),
            );
            self.push_back_token(equals);
            return;
        }
        let mut simple = Simple::default();
        self.parse_specifiers_and_declarators(&mut simple, &SpecDcorMode::TypeID);
        let Simple {
            decl_specifier_seq,
            init_declarators,
            ..
        } = simple;
        let dcor = init_declarators
            .into_iter()
            .next()
            .map(|init_dcor| init_dcor.dcor)
            .unwrap_or_default();
        let semicolon = self.parse_required_semicolon();
        self.visor.got_declaration(Declaration::Alias {
            using,
            name: token2,
            equals,
            decl_specifier_seq,
            dcor,
            semicolon,
        });
    }

    /// 宣言を1つ読む。どの宣言も始まらなければ何も読まずに偽を返す
    pub(crate) fn parse_declaration(&mut self, enclosing_class_name: &str) -> bool {
        let token = self.read_token();
        trace!(token = %token, linear_loc = token.linear_loc, "declaration");
        match token.kind {
            TokenKind::Identifier => {}
            TokenKind::Semicolon => {
                self.visor
                    .got_declaration(Declaration::Empty { semicolon: token });
                return true;
            }
            TokenKind::Tilde => {
                self.push_back_token(token);
                self.parse_simple_declaration(enclosing_class_name);
                return true;
            }
            _ => {
                self.push_back_token(token);
                return false;
            }
        }

        match token.text.as_str() {
            "extern" => {
                self.stop_muting_errors();
                self.parse_extern_declaration(token, enclosing_class_name);
            }
            "public" | "private" | "protected" => {
                self.stop_muting_errors();
                let colon = self.read_token();
                if colon.kind == TokenKind::SingleColon {
                    self.visor.got_declaration(Declaration::AccessSpecifier {
                        keyword: token,
                        colon,
                    });
                } else {
                    self.error(
                        true,
                        ParseError::expected(ExpectedToken::Colon, colon.clone()).after(token),
                    );
                    self.push_back_token(colon);
                }
            }
            "static_assert" => {
                self.stop_muting_errors();
                let open_paren = self.read_token();
                if open_paren.kind != TokenKind::OpenParen {
                    self.error(
                        true,
                        ParseError::expected(ExpectedToken::OpenParen, open_paren.clone())
                            .after(token),
                    );
                    self.push_back_token(open_paren);
                } else if let Some(close_paren) = self.skip_any_scope(&open_paren) {
                    let semicolon = self.parse_required_semicolon();
                    self.visor.got_declaration(Declaration::StaticAssert {
                        keyword: token,
                        arg_list: ExpressionCall {
                            open_paren,
                            close_paren,
                            arguments: Vec::new(),
                        },
                        semicolon,
                    });
                }
            }
            "namespace" => {
                self.stop_muting_errors();
                self.parse_namespace(token);
            }
            "template" => {
                self.stop_muting_errors();
                self.parse_template(token, enclosing_class_name);
            }
            "using" => {
                self.stop_muting_errors();
                self.parse_using(token);
            }
            _ => {
                self.push_back_token(token);
                self.parse_simple_declaration(enclosing_class_name);
            }
        }
        true
    }

    /// 宣言の並びを読む
    ///
    /// `close_expected` なら `}` で終わり、そのトークンを返す。
    /// そうでなければファイル終端で終わる（終端は読み戻しておく）。
    pub(crate) fn parse_declaration_list(
        &mut self,
        close_expected: bool,
        enclosing_class_name: &str,
    ) -> Token {
        // ファイルスコープでも `}` はここで引き受ける
        self.with_accept_flags(TokenKind::OpenCurly, |p| {
            let end_kind = if close_expected {
                TokenKind::CloseCurly
            } else {
                TokenKind::EndOfFile
            };
            loop {
                let token = p.read_token();
                if token.kind == end_kind {
                    if close_expected {
                        return token;
                    }
                    p.push_back_token(token);
                    return Token::default();
                }
                p.push_back_token(token);
                if p.parse_declaration(enclosing_class_name) {
                    continue;
                }

                let token = p.read_token();
                p.error(
                    true,
                    ParseError::expected(ExpectedToken::Declaration, token.clone()),
                );
                // 余分な `}` はエラーを出して読み捨てる
                if token.kind != TokenKind::CloseCurly
                    && !p.handle_unexpected_token(&token, None)
                {
                    debug_assert_eq!(token.kind, TokenKind::EndOfFile);
                    return Token::default();
                }
            }
        })
    }
}
