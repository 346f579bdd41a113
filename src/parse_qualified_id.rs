//! 修飾IDとネスト名指定子のパース

use crate::error::{ExpectedToken, ParseError};
use crate::grammar::{
    DeclaratorProduction, NestedNameComponent, NestedNameComponentType, QualifiedID, Simple,
    TemplateArgument, TemplateArgumentWithComma, UnqualifiedID,
};
use crate::parse_specifiers::SpecDcorMode;
use crate::parser::{Parser, RestorePoint};
use crate::token::{Token, TokenKind};

/// 修飾IDとしてどこまで要求するか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParseQualifiedMode {
    AllowIncomplete,
    RequireComplete,
    RequireCompleteOrEmpty,
}

/// ネスト名の一部にならない識別子
const NON_NAME_KEYWORDS: &[&str] = &["operator", "const", "volatile", "inline", "static", "friend"];

/// `operator` の後に置ける記号
fn is_overloadable_operator(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::LeftShift
            | TokenKind::RightShift
            | TokenKind::SinglePlus
            | TokenKind::DoublePlus
            | TokenKind::SingleMinus
            | TokenKind::DoubleMinus
            | TokenKind::Star
            | TokenKind::Arrow
            | TokenKind::ForwardSlash
            | TokenKind::SingleEqual
            | TokenKind::DoubleEqual
            | TokenKind::NotEqual
            | TokenKind::PlusEqual
            | TokenKind::MinusEqual
            | TokenKind::StarEqual
            | TokenKind::SlashEqual
            | TokenKind::OpenAngle
            | TokenKind::CloseAngle
            | TokenKind::LessThanOrEqual
            | TokenKind::GreaterThanOrEqual
            | TokenKind::OpenParen
            | TokenKind::OpenSquare
    )
}

/// テンプレート引数リストの結果
struct TemplateArgs {
    args: Vec<TemplateArgumentWithComma>,
    close_angled: Token,
    /// 外側のスコープに処理を任せて途中で終わった
    cancelled: bool,
}

impl Parser<'_> {
    /// ネスト名指定子を読めるだけ読む。読めないトークンはエラーにせず戻す
    fn parse_nested_name_specifier(&mut self) -> Vec<NestedNameComponent> {
        let mut nested_name = Vec::new();
        loop {
            let token = self.read_token();
            if token.kind != TokenKind::Identifier
                || NON_NAME_KEYWORDS.contains(&token.text.as_str())
            {
                self.push_back_token(token);
                break;
            }

            let kind = if token.text == "decltype" {
                let punc = self.read_token();
                if punc.kind == TokenKind::OpenParen {
                    let close_paren = self.skip_any_scope(&punc).unwrap_or_default();
                    NestedNameComponentType::DeclType {
                        keyword: token,
                        open_paren: punc,
                        close_paren,
                    }
                } else {
                    self.error(
                        true,
                        ParseError::expected(ExpectedToken::OpenParen, punc.clone())
                            .after(token.clone()),
                    );
                    self.push_back_token(punc);
                    NestedNameComponentType::DeclType {
                        keyword: token,
                        open_paren: Token::default(),
                        close_paren: Token::default(),
                    }
                }
            } else {
                let punc = self.read_token();
                // 名前がテンプレートかどうかは分からないので、常にテンプレートとみなす
                if punc.kind == TokenKind::OpenAngle && self.pass_number <= 1 {
                    let result = self.parse_template_argument_list();
                    let kind = NestedNameComponentType::IdentifierOrTemplated {
                        name: token,
                        open_angled: punc,
                        close_angled: result.close_angled,
                        args: result.args,
                    };
                    if result.cancelled {
                        nested_name.push(NestedNameComponent {
                            kind,
                            sep: Token::default(),
                        });
                        break;
                    }
                    kind
                } else {
                    self.push_back_token(punc);
                    NestedNameComponentType::IdentifierOrTemplated {
                        name: token,
                        open_angled: Token::default(),
                        close_angled: Token::default(),
                        args: Vec::new(),
                    }
                }
            };

            let sep = self.read_token();
            if sep.kind == TokenKind::DoubleColon {
                nested_name.push(NestedNameComponent { kind, sep });
            } else {
                self.push_back_token(sep);
                nested_name.push(NestedNameComponent {
                    kind,
                    sep: Token::default(),
                });
                break;
            }
        }
        nested_name
    }

    /// `<` の直後から `>` までのテンプレート引数を読む
    ///
    /// 各引数はまず型IDとして試し、失敗したらトークン範囲として記録する。
    fn parse_template_argument_list(&mut self) -> TemplateArgs {
        self.with_accept_flags(TokenKind::OpenAngle, |p| {
            let mut args = Vec::new();
            loop {
                let start_token = p.peek_token();
                let rp = RestorePoint::begin(p);
                let mut simple = Simple::default();
                p.parse_specifiers_and_declarators(&mut simple, &SpecDcorMode::TypeID);
                let mut kind = if !rp.error_occurred(p) {
                    rp.cancel(p);
                    let (decl_specifier_seq, abstract_dcor) = take_type_id(simple);
                    TemplateArgument::TypeID {
                        decl_specifier_seq,
                        abstract_dcor,
                    }
                } else {
                    rp.backtrack(p);
                    rp.cancel(p);
                    TemplateArgument::Unknown {
                        start_token: start_token.clone(),
                        end_token: Token::default(),
                    }
                };

                let comma = loop {
                    let sep = p.read_token();
                    match sep.kind {
                        TokenKind::CloseAngle => {
                            p.stop_muting_errors();
                            args.push(TemplateArgumentWithComma {
                                kind,
                                comma: Token::default(),
                            });
                            return TemplateArgs {
                                args,
                                close_angled: sep,
                                cancelled: false,
                            };
                        }
                        TokenKind::Comma => {
                            p.stop_muting_errors();
                            break sep;
                        }
                        _ => {
                            // 型として読めなかった残りはトークン範囲にする
                            let mut end_token = sep.clone();
                            let stay = p.handle_unexpected_token(&sep, Some(&mut end_token));
                            kind = TemplateArgument::Unknown {
                                start_token: start_token.clone(),
                                end_token,
                            };
                            if !stay {
                                args.push(TemplateArgumentWithComma {
                                    kind,
                                    comma: Token::default(),
                                });
                                return TemplateArgs {
                                    args,
                                    close_angled: Token::default(),
                                    cancelled: true,
                                };
                            }
                        }
                    }
                };
                args.push(TemplateArgumentWithComma { kind, comma });
            }
        })
    }

    /// 修飾IDを読めるだけ読む
    ///
    /// `mode` が要求する形にならなかったときだけエラーを出す。
    pub(crate) fn parse_qualified_id(&mut self, mode: ParseQualifiedMode) -> QualifiedID {
        let mut qid = QualifiedID {
            nested_name: self.parse_nested_name_specifier(),
            unqual: UnqualifiedID::Empty,
        };

        // 区切りのない末尾要素は非修飾IDになる
        if qid.nested_name.last().is_some_and(|tail| !tail.sep.is_valid())
            && let Some(tail) = qid.nested_name.pop()
        {
            qid.unqual = match tail.kind {
                NestedNameComponentType::IdentifierOrTemplated {
                    name,
                    open_angled,
                    close_angled,
                    args,
                } => {
                    if open_angled.is_valid() {
                        UnqualifiedID::TemplateID {
                            name,
                            open_angled,
                            close_angled,
                            args,
                        }
                    } else {
                        UnqualifiedID::Identifier { name }
                    }
                }
                NestedNameComponentType::DeclType {
                    keyword,
                    open_paren,
                    close_paren,
                } => UnqualifiedID::DeclType {
                    keyword,
                    open_paren,
                    close_paren,
                },
            };
        }

        if qid.unqual.is_empty() {
            let token = self.read_token();
            if token.kind == TokenKind::Tilde {
                let name = self.read_token();
                if name.kind == TokenKind::Identifier {
                    qid.unqual = UnqualifiedID::Destructor { tilde: token, name };
                } else {
                    self.error(
                        true,
                        ParseError::expected(ExpectedToken::DestructorClassName, name.clone())
                            .after(token),
                    );
                    self.push_back_token(name);
                }
            } else if token.is_ident("operator") {
                qid.unqual = self.parse_operator_func_id(token);
            } else {
                self.push_back_token(token);
            }
        }

        let missing = match mode {
            ParseQualifiedMode::AllowIncomplete => false,
            ParseQualifiedMode::RequireComplete => !qid.is_complete(),
            ParseQualifiedMode::RequireCompleteOrEmpty => qid.is_nested_name_only(),
        };
        if missing {
            let token = self.read_token();
            self.error(
                true,
                ParseError::expected(ExpectedToken::QualifiedID, token.clone()),
            );
            self.push_back_token(token);
        }
        qid
    }

    /// `operator` の後の演算子を読む
    fn parse_operator_func_id(&mut self, keyword: Token) -> UnqualifiedID {
        let op = self.read_token();
        if !is_overloadable_operator(op.kind) {
            self.error(
                true,
                ParseError::expected(ExpectedToken::OperatorToken, op.clone()).after(keyword.clone()),
            );
            self.push_back_token(op);
            return UnqualifiedID::OperatorFunc {
                keyword,
                punc: Token::default(),
                punc2: Token::default(),
            };
        }

        // `operator()` と `operator[]` は2トークン
        let mut punc2 = Token::default();
        if let Some(close_kind) = op.kind.close_of()
            && matches!(op.kind, TokenKind::OpenParen | TokenKind::OpenSquare)
        {
            let next = self.read_token();
            if next.kind == close_kind {
                punc2 = next;
            } else {
                let expected = if close_kind == TokenKind::CloseParen {
                    ExpectedToken::CloseParen
                } else {
                    ExpectedToken::CloseSquare
                };
                self.error(
                    true,
                    ParseError::expected(expected, next.clone()).after(op.clone()),
                );
                self.push_back_token(next);
            }
        }
        UnqualifiedID::OperatorFunc {
            keyword,
            punc: op,
            punc2,
        }
    }
}

/// 型IDとして読んだ単純宣言から指定子と抽象宣言子を取り出す
pub(crate) fn take_type_id(
    simple: Simple,
) -> (
    Vec<crate::grammar::DeclSpecifier>,
    Option<Box<DeclaratorProduction>>,
) {
    let Simple {
        decl_specifier_seq,
        init_declarators,
        ..
    } = simple;
    debug_assert!(init_declarators.len() <= 1);
    let abstract_dcor = init_declarators.into_iter().next().and_then(|d| {
        debug_assert!(d.dcor.qid.is_empty());
        d.dcor.prod
    });
    (decl_specifier_seq, abstract_dcor)
}
