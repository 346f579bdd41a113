//! 関数引数リストとテンプレート引数宣言リストのパース

use crate::error::{ExpectedToken, ParseError};
use crate::grammar::{
    Chain, DeclSpecifier, FunctionDeclarator, FunctionQualifierSeq, ParamDeclarationList,
    ParamDeclarationWithComma, ProductionKind, Simple, Template, insert_at,
};
use crate::parse_specifiers::SpecDcorMode;
use crate::parser::{ParseActivity, Parser};
use crate::token::{Token, TokenKind};

/// 引数リストの括弧と宣言モード
struct ParamsKind {
    open_punc: TokenKind,
    close_punc: TokenKind,
    mode: SpecDcorMode<'static>,
    expected_sep: ExpectedToken,
}

const FUNC_PARAMS: ParamsKind = ParamsKind {
    open_punc: TokenKind::OpenParen,
    close_punc: TokenKind::CloseParen,
    mode: SpecDcorMode::Param,
    expected_sep: ExpectedToken::CommaOrCloseParen,
};

const TEMPLATE_PARAMS: ParamsKind = ParamsKind {
    open_punc: TokenKind::OpenAngle,
    close_punc: TokenKind::CloseAngle,
    mode: SpecDcorMode::TemplateParam,
    expected_sep: ExpectedToken::CommaOrCloseAngle,
};

impl Parser<'_> {
    /// 引数宣言リストを読む
    ///
    /// 呼び出し側は次のトークンが開き括弧であることを確認しておくこと。
    pub(crate) fn parse_parameter_declaration_list(
        &mut self,
        params: &mut ParamDeclarationList,
        for_template: bool,
    ) {
        let kind = if for_template {
            &TEMPLATE_PARAMS
        } else {
            &FUNC_PARAMS
        };

        let open = self.read_token();
        debug_assert_eq!(open.kind, kind.open_punc);
        params.open_punc = open;
        self.stop_muting_errors();

        let token = self.read_token();
        if token.kind == kind.close_punc {
            params.close_punc = token;
            return;
        }
        self.push_back_token(token);

        self.with_accept_flags(kind.open_punc, |p| {
            loop {
                let (param, consumed) = p.parse_one_parameter(kind, for_template);
                let has_param = param.is_some();
                if let Some(param) = param {
                    params.params.push(param);
                }

                let token = p.read_token();
                if token.kind == kind.close_punc {
                    params.close_punc = token;
                    break;
                }
                if token.kind == TokenKind::Comma {
                    if has_param && let Some(last) = params.params.last_mut() {
                        last.comma = token;
                    }
                    continue;
                }

                p.error(true, ParseError::expected(kind.expected_sep, token.clone()));
                if consumed {
                    // 引数の途中で止まったので、このトークンから読み直す
                    if !p.ok_to_stay_in_scope(&token) {
                        break;
                    }
                    p.push_back_token(token);
                } else if !p.handle_unexpected_token(&token, None) {
                    break;
                }
            }
        });
    }

    /// 引数宣言を1つ読む。戻り値の2つ目はトークンを消費したか
    fn parse_one_parameter(
        &mut self,
        kind: &ParamsKind,
        for_template: bool,
    ) -> (Option<ParamDeclarationWithComma>, bool) {
        let first = self.read_token();

        if first.kind == TokenKind::Ellipsis && !for_template {
            let param = ParamDeclarationWithComma {
                decl_specifier_seq: vec![DeclSpecifier::Ellipsis(first)],
                ..Default::default()
            };
            return (Some(param), true);
        }

        if for_template && first.is_ident("template") {
            self.parse_template_template_parameter(first);
            return (None, true);
        }

        self.push_back_token(first);
        let pa = ParseActivity::begin(self);
        let mut simple = Simple::default();
        self.parse_specifiers_and_declarators(&mut simple, &kind.mode);
        if !pa.error_occurred(self) {
            self.stop_muting_errors();
        }
        let consumed = pa.any_tokens_consumed(self);

        // エラーがなければ宣言子はちょうど1つ（抽象宣言子でもよい）
        debug_assert!(simple.init_declarators.len() <= 1);
        let Simple {
            decl_specifier_seq,
            init_declarators,
            ..
        } = simple;
        let param = init_declarators
            .into_iter()
            .next()
            .map(|init_dcor| ParamDeclarationWithComma {
                decl_specifier_seq,
                dcor: init_dcor.dcor,
                init: init_dcor.init,
                comma: Token::default(),
            });
        (param, consumed)
    }

    /// `template <...> class Name` 形式のテンプレートテンプレート引数
    ///
    /// 構文木には残さない。
    fn parse_template_template_parameter(&mut self, keyword: Token) {
        let mut tmpl = Template {
            keyword,
            ..Default::default()
        };
        let open = self.peek_token();
        if open.kind != TokenKind::OpenAngle {
            self.error(true, ParseError::expected(ExpectedToken::OpenAngle, open));
            return;
        }
        let pa = ParseActivity::begin(self);
        self.with_close_angles_only(true, |p| {
            p.parse_parameter_declaration_list(&mut tmpl.params, true)
        });
        if pa.error_occurred(self) {
            return;
        }
        let class_token = self.read_token();
        if !class_token.is_ident("class") && !class_token.is_ident("typename") {
            self.error(
                true,
                ParseError::expected(ExpectedToken::ClassKeyword, class_token.clone()),
            );
            self.push_back_token(class_token);
            return;
        }
        let mut simple = Simple::default();
        self.parse_specifiers_and_declarators(&mut simple, &SpecDcorMode::TypeID);
        if !pa.error_occurred(self) {
            self.stop_muting_errors();
        }
    }

    /// 関数の後置修飾子（`const`, `override`, `&`, `&&`）
    pub(crate) fn parse_function_qualifier_seq(&mut self) -> FunctionQualifierSeq {
        let mut qualifiers = FunctionQualifierSeq::default();
        loop {
            let token = self.read_token();
            let is_qualifier = match token.kind {
                TokenKind::Identifier => {
                    matches!(token.text.as_str(), "const" | "override" | "noexcept" | "final")
                }
                TokenKind::SingleAmpersand | TokenKind::DoubleAmpersand => true,
                _ => false,
            };
            if !is_qualifier {
                self.push_back_token(token);
                break;
            }
            qualifiers.tokens.push(token);
        }
        qualifiers
    }

    /// 関数の引数リストを読み、宣言子チェーンの `depth` 段目に関数の段を差し込む
    ///
    /// 差し込んだ段の位置を返し、`depth` をその次に進める。
    /// `(` で始まらなければエラーにして `None` を返す。
    pub(crate) fn parse_parameter_list(
        &mut self,
        chain: &mut Chain,
        depth: &mut usize,
    ) -> Option<usize> {
        let open = self.peek_token();
        if open.kind != TokenKind::OpenParen {
            // コンストラクタとして試しているときだけ起こる
            self.error(true, ParseError::expected(ExpectedToken::OpenParen, open));
            return None;
        }
        self.stop_muting_errors();

        let mut function = FunctionDeclarator::default();
        self.parse_parameter_declaration_list(&mut function.params, false);
        function.qualifiers = self.parse_function_qualifier_seq();

        let fn_depth = *depth;
        insert_at(chain, fn_depth, ProductionKind::Function(function));
        *depth += 1;
        Some(fn_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::VisitedFiles;
    use crate::preprocessor::{PPConfig, Preprocessor};
    use crate::supervisor::CollectingSupervisor;

    fn parse_params(src: &str, for_template: bool) -> (ParamDeclarationList, usize, TokenKind) {
        let mut files = VisitedFiles::new();
        let mut visor = CollectingSupervisor::default();
        let (params, next) = {
            let mut pp = Preprocessor::new(&mut files, PPConfig::default());
            pp.push_source("params.h", src);
            let mut parser = Parser::new(pp, &mut visor);
            let mut params = ParamDeclarationList::default();
            if for_template {
                parser.with_close_angles_only(true, |p| {
                    p.parse_parameter_declaration_list(&mut params, true)
                });
            } else {
                parser.parse_parameter_declaration_list(&mut params, false);
            }
            (params, parser.read_token().kind)
        };
        (params, visor.errors.len(), next)
    }

    #[test]
    fn test_function_parameters() {
        let (params, errors, next) = parse_params("(int a, const char* b = nullptr, ...) ;", false);
        assert_eq!(errors, 0);
        assert_eq!(params.params.len(), 3);
        assert_eq!(params.params[0].comma.kind, TokenKind::Comma);
        assert!(matches!(
            params.params[2].decl_specifier_seq[0],
            DeclSpecifier::Ellipsis(_)
        ));
        assert_eq!(params.close_punc.kind, TokenKind::CloseParen);
        assert_eq!(next, TokenKind::Semicolon);
    }

    #[test]
    fn test_template_parameters() {
        let (params, errors, _) = parse_params(
            "<typename T, class U, int N = 4, template <typename> class Tmpl> x",
            true,
        );
        assert_eq!(errors, 0);
        assert_eq!(params.params.len(), 3);
        assert!(matches!(
            params.params[0].decl_specifier_seq[0],
            DeclSpecifier::TypeParam { .. }
        ));
        assert!(matches!(
            params.params[1].decl_specifier_seq[0],
            DeclSpecifier::TypeParam { .. }
        ));
        assert_eq!(params.close_punc.kind, TokenKind::CloseAngle);
    }

    #[test]
    fn test_bad_separator_recovers() {
        let (params, errors, next) = parse_params("(int a b, int c) ;", false);
        assert_eq!(errors, 1);
        assert_eq!(params.close_punc.kind, TokenKind::CloseParen);
        assert_eq!(next, TokenKind::Semicolon);
    }
}
