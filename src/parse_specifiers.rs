//! 宣言指定子と宣言子のパース
//!
//! 宣言子は2段階で読む。前半は `*`, `&`, cv修飾子を右から左へ
//! チェーンの先頭に積み、名前か括弧で終わる。後半は配列と関数の
//! 接尾辞を左から右へ、前半の最後の段の直後に差し込む。
//! 括弧で入れ子になった宣言子の接尾辞は、入れ子の段と外側の段の
//! 境目に入る。

use crate::error::{ExpectedToken, ParseError, ParseErrorKind};
use crate::grammar::{
    AssignmentType, BaseSpecifierWithComma, Chain, DeclSpecifier, Declarator,
    DeclaratorProduction, EnumSpecifier, FunctionDeclarator, Initializer,
    InitDeclaratorWithComma, MemberInitializerWithComma, NestedNameComponentType, ProductionKind,
    QualifiedID, Record, Simple, UnqualifiedID, chain_len, insert_at, pop_head, slot_at,
};
use crate::parse_expressions::expression_from_range;
use crate::parse_qualified_id::{ParseQualifiedMode, take_type_id};
use crate::parser::{ParseActivity, Parser, RestorePoint, accept};
use crate::supervisor::ScopeRef;
use crate::token::{Token, TokenKind};

/// 指定子と宣言子をどの文脈で読むか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpecDcorMode<'n> {
    /// 名前空間スコープかクラスメンバー。クラスメンバーならクラス名を持つ
    GlobalOrMember(&'n str),
    Param,
    TemplateParam,
    TypeID,
}

impl SpecDcorMode<'_> {
    pub fn is_any_param(&self) -> bool {
        matches!(self, SpecDcorMode::Param | SpecDcorMode::TemplateParam)
    }

    pub fn is_any_type_id(&self) -> bool {
        matches!(self, SpecDcorMode::TypeID)
    }

    fn is_global_or_member(&self) -> bool {
        matches!(self, SpecDcorMode::GlobalOrMember(_))
    }
}

/// 宣言子に名前を許すか、抽象宣言子を許すか
mod dcor_flags {
    pub const ALLOW_NAMED: u32 = 1;
    pub const ALLOW_ABSTRACT: u32 = 2;
}

/// 単独で宣言指定子になるキーワード
const KEYWORD_SPECIFIERS: &[&str] = &[
    "inline",
    "const",
    "volatile",
    "static",
    "friend",
    "virtual",
    "constexpr",
    "thread_local",
    "mutable",
    "explicit",
];

/// 符号と長さの修飾。それだけで型指定子になり、互いに組み合わせられる
const BUILTIN_TYPE_MODIFIERS: &[&str] = &["signed", "unsigned", "short", "long"];

/// 修飾の後に続けられる基本型
const COMBINABLE_BUILTIN_TYPES: &[&str] = &["int", "char", "double"];

fn is_pointer_punc(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Star | TokenKind::SingleAmpersand | TokenKind::DoubleAmpersand
    )
}

/// チェーンの `depth` 段目が関数なら、その関数宣言子
fn function_at(chain: &mut Chain, depth: usize) -> Option<&mut FunctionDeclarator> {
    match slot_at(chain, depth) {
        Some(node) => match &mut node.kind {
            ProductionKind::Function(function) => Some(function),
            _ => None,
        },
        None => None,
    }
}

/// 型宣言（クラスか列挙型の指定子を含む）か
pub(crate) fn is_type_declaration(simple: &Simple) -> bool {
    simple
        .decl_specifier_seq
        .iter()
        .any(|spec| matches!(spec, DeclSpecifier::Record(_) | DeclSpecifier::Enum(_)))
}

/// コンストラクタかデストラクタの名前に見えるか
///
/// クラスの中ならクラス名と同じ名前、外なら `Foo::Foo` の形。
pub(crate) fn looks_like_ctor_dtor(enclosing_class_name: &str, qid: &QualifiedID) -> bool {
    let name = qid.unqual.get_ctor_dtor_name();
    if name.is_empty() {
        return false;
    }
    if enclosing_class_name.is_empty() {
        match qid.nested_name.last().map(|tail| &tail.kind) {
            Some(NestedNameComponentType::IdentifierOrTemplated { name: tail, .. }) => {
                tail.text == name
            }
            _ => false,
        }
    } else {
        qid.nested_name.is_empty() && name == enclosing_class_name
    }
}

impl Parser<'_> {
    /// 変換関数の型（`operator const Foo*` の `const Foo*` 部分）
    ///
    /// 読めないトークンはエラーにせず戻す。
    fn parse_conversion_type_id(&mut self) -> (Vec<DeclSpecifier>, Chain) {
        let mut decl_specifier_seq = Vec::new();
        let mut got_type_specifier = false;
        loop {
            let token = self.read_token();
            if token.kind != TokenKind::Identifier {
                self.push_back_token(token);
                break;
            }
            if token.text == "const" || token.text == "volatile" {
                decl_specifier_seq.push(DeclSpecifier::Keyword(token));
                continue;
            }
            if BUILTIN_TYPE_MODIFIERS.contains(&token.text.as_str()) {
                got_type_specifier = true;
                decl_specifier_seq.push(DeclSpecifier::Keyword(token));
                continue;
            }
            if got_type_specifier && COMBINABLE_BUILTIN_TYPES.contains(&token.text.as_str()) {
                decl_specifier_seq.push(DeclSpecifier::TypeID {
                    typename: Token::default(),
                    qid: QualifiedID::from_identifier(token),
                    was_assumed: false,
                });
                continue;
            }
            self.push_back_token(token);
            let qid = self.parse_qualified_id(ParseQualifiedMode::RequireComplete);
            if qid.is_empty() {
                break;
            }
            if got_type_specifier {
                self.error(
                    false,
                    ParseError::new(ParseErrorKind::TooManyTypeSpecifiers, qid.get_first_token()),
                );
            } else {
                got_type_specifier = true;
                decl_specifier_seq.push(DeclSpecifier::TypeID {
                    typename: Token::default(),
                    qid,
                    was_assumed: false,
                });
            }
        }
        (decl_specifier_seq, self.parse_conversion_abstract_declarator())
    }

    /// 変換関数の型に続く `*`, `&`, cv修飾子だけの抽象宣言子
    fn parse_conversion_abstract_declarator(&mut self) -> Chain {
        let mut chain: Chain = None;
        let mut allow_qualifier = false;
        loop {
            let token = self.read_token();
            if is_pointer_punc(token.kind) {
                allow_qualifier = token.kind == TokenKind::Star;
                insert_at(
                    &mut chain,
                    0,
                    ProductionKind::PointerTo {
                        nested_name: Vec::new(),
                        punc: token,
                    },
                );
            } else if token.kind == TokenKind::Ellipsis {
                // パック展開は段にしない
            } else if token.is_ident("const") || token.is_ident("volatile") {
                if !allow_qualifier {
                    self.error(
                        false,
                        ParseError::new(ParseErrorKind::QualifierNotAllowedHere, token.clone()),
                    );
                }
                insert_at(&mut chain, 0, ProductionKind::Qualifier { keyword: token });
            } else {
                self.push_back_token(token);
                break;
            }
        }
        chain
    }

    /// `->` があれば後置戻り値型を読む
    fn parse_optional_trailing_return_type(&mut self, function: &mut FunctionDeclarator) {
        let arrow = self.read_token();
        if arrow.kind != TokenKind::Arrow {
            self.push_back_token(arrow);
            return;
        }
        let qid_start = self.peek_token();
        function.trailing_ret_type = self.parse_qualified_id(ParseQualifiedMode::AllowIncomplete);
        if function.trailing_ret_type.is_empty() {
            self.error(
                true,
                ParseError::expected(ExpectedToken::TrailingReturnType, qid_start)
                    .after(arrow.clone()),
            );
        }
        function.arrow = arrow;
    }

    /// 宣言子を読む
    ///
    /// `nested` は外側で既に読んだ段で、新しいチェーンの末尾になる。
    /// 不正なトークンに出会ったら、外側のスコープが引き受けるトークンまで
    /// 消費して戻る。最初の不正なトークンでエラーを抑制し始め、
    /// 抑制は次に正しいトークンを読むまで続く。
    pub(crate) fn parse_declarator(&mut self, dcor: &mut Declarator, nested: Chain, flags: u32) {
        dcor.prod = nested;
        let mut allow_qualifier = false;
        let mut expecting_qualified_id = false;
        // 後半の接尾辞を差し込む段
        let mut suffix_depth = 0usize;

        // 前半: 名前か括弧まで
        loop {
            let qid = self.parse_qualified_id(ParseQualifiedMode::AllowIncomplete);
            if !qid.unqual.is_empty() {
                if flags & dcor_flags::ALLOW_NAMED == 0 {
                    // エラーは抑制しない
                    self.error(
                        false,
                        ParseError::new(ParseErrorKind::TypeIDCannotHaveName, qid.get_first_token()),
                    );
                }
                dcor.qid = qid;
                break;
            }

            let mut token = self.read_token();
            if token.kind == TokenKind::OpenParen {
                if !qid.nested_name.is_empty() {
                    self.error(
                        false,
                        ParseError::new(ParseErrorKind::NestedNameNotAllowedHere, token.clone())
                            .after(qid.get_first_token()),
                    );
                }
                self.stop_muting_errors();

                if flags & dcor_flags::ALLOW_ABSTRACT != 0 {
                    // 抽象宣言子なら、まず関数の引数リストとして試す
                    self.push_back_token(token);
                    let rp = RestorePoint::begin(self);
                    let mut depth = 0;
                    let fn_depth = self.parse_parameter_list(&mut dcor.prod, &mut depth);
                    if !rp.error_occurred(self) {
                        rp.cancel(self);
                        if let Some(d) = fn_depth
                            && let Some(function) = function_at(&mut dcor.prod, d)
                        {
                            self.parse_optional_trailing_return_type(function);
                        }
                        suffix_depth = depth;
                        break;
                    }
                    // 作りかけの段を外して読み直す
                    if fn_depth.is_some() {
                        pop_head(&mut dcor.prod);
                    }
                    rp.backtrack(self);
                    rp.cancel(self);
                    token = self.read_token();
                }

                // 括弧で入れ子になった宣言子
                let outer = dcor.prod.take();
                let outer_len = chain_len(&outer);
                let mut target = Declarator::default();
                self.parse_declarator(&mut target, outer, flags);
                let inner_len = chain_len(&target.prod);
                debug_assert!(dcor.qid.is_empty());
                dcor.qid = target.qid;
                let close = self.close_scope(&token);
                dcor.prod = Some(Box::new(DeclaratorProduction {
                    kind: ProductionKind::Parenthesized {
                        open_paren: token,
                        close_paren: close.clone().unwrap_or_default(),
                    },
                    target: target.prod,
                }));
                if close.is_none() {
                    return;
                }
                suffix_depth = 1 + inner_len.saturating_sub(outer_len);
                break;
            }

            if !qid.nested_name.is_empty() && token.kind != TokenKind::Star {
                self.error(
                    false,
                    ParseError::new(ParseErrorKind::NestedNameNotAllowedHere, token.clone())
                        .after(qid.get_first_token()),
                );
            }

            if is_pointer_punc(token.kind) {
                self.stop_muting_errors();
                allow_qualifier = token.kind == TokenKind::Star;
                insert_at(
                    &mut dcor.prod,
                    0,
                    ProductionKind::PointerTo {
                        nested_name: qid.nested_name,
                        punc: token,
                    },
                );
            } else if token.kind == TokenKind::Ellipsis {
                // パック展開は段にしない
                self.stop_muting_errors();
            } else if token.kind == TokenKind::Identifier {
                // 修飾IDの途中で止まる識別子は cv修飾子などに限られる
                if !allow_qualifier {
                    self.error(
                        false,
                        ParseError::new(ParseErrorKind::QualifierNotAllowedHere, token.clone()),
                    );
                }
                self.stop_muting_errors();
                insert_at(&mut dcor.prod, 0, ProductionKind::Qualifier { keyword: token });
            } else {
                if flags & dcor_flags::ALLOW_ABSTRACT == 0 {
                    // 段がひとつもない空の宣言子（`struct Foo {};` など）は許す
                    if dcor.prod.is_some() {
                        self.error(
                            true,
                            ParseError::expected(ExpectedToken::QualifiedID, token.clone()),
                        );
                    } else {
                        expecting_qualified_id = true;
                    }
                }
                self.push_back_token(token);
                break;
            }
        }

        // 後半: 配列と関数の接尾辞
        loop {
            let token = self.read_token();
            match token.kind {
                TokenKind::OpenSquare => {
                    self.check_expecting_qualified_id(&mut expecting_qualified_id, &token);
                    let (start, end) = self.parse_expression(true);
                    let close = self.close_scope(&token);
                    insert_at(
                        &mut dcor.prod,
                        suffix_depth,
                        ProductionKind::ArrayOf {
                            open_square: token,
                            close_square: close.clone().unwrap_or_default(),
                            size: expression_from_range(start, end),
                        },
                    );
                    suffix_depth += 1;
                    if close.is_none() {
                        return;
                    }
                }
                TokenKind::OpenParen => {
                    self.check_expecting_qualified_id(&mut expecting_qualified_id, &token);
                    self.push_back_token(token);
                    let fn_depth = self.parse_parameter_list(&mut dcor.prod, &mut suffix_depth);
                    if let Some(d) = fn_depth
                        && let Some(function) = function_at(&mut dcor.prod, d)
                    {
                        self.parse_optional_trailing_return_type(function);
                    }
                }
                _ => {
                    self.push_back_token(token);
                    break;
                }
            }
        }
    }

    fn check_expecting_qualified_id(&mut self, expecting: &mut bool, token: &Token) {
        self.stop_muting_errors();
        if *expecting {
            self.error(
                true,
                ParseError::expected(ExpectedToken::QualifiedID, token.clone()),
            );
            *expecting = false;
        }
    }

    /// コンストラクタのメンバー初期化子リスト（`:` の直後から `{` の手前まで）
    fn parse_member_initializer_list(&mut self) -> Vec<MemberInitializerWithComma> {
        // `{` が来たら、場所がおかしくても呼び出し側に返す
        self.with_extra_accept_flags(accept::OPEN_CURLY, |p| {
            let mut inits: Vec<MemberInitializerWithComma> = Vec::new();
            loop {
                let qid = p.parse_qualified_id(ParseQualifiedMode::AllowIncomplete);
                if !qid.is_complete() {
                    let token = p.read_token();
                    p.error(
                        true,
                        ParseError::expected(ExpectedToken::BaseOrMember, token.clone()),
                    );
                    if !qid.is_empty() {
                        p.push_back_token(token);
                    } else if !p.handle_unexpected_token(&token, None) {
                        break;
                    }
                    continue;
                }

                let open = p.read_token();
                if !matches!(open.kind, TokenKind::OpenParen | TokenKind::OpenCurly) {
                    p.error(
                        true,
                        ParseError::expected(ExpectedToken::OpenCurlyOrParen, open.clone()),
                    );
                    p.push_back_token(open);
                    continue;
                }
                let close = p.skip_any_scope(&open).unwrap_or_default();
                inits.push(MemberInitializerWithComma {
                    qid,
                    open_punc: open,
                    close_punc: close,
                    comma: Token::default(),
                });

                let next = p.read_token();
                match next.kind {
                    TokenKind::OpenCurly => {
                        p.stop_muting_errors();
                        p.push_back_token(next);
                        break;
                    }
                    TokenKind::Comma => {
                        p.stop_muting_errors();
                        if let Some(last) = inits.last_mut() {
                            last.comma = next;
                        }
                    }
                    _ => {
                        p.error(
                            true,
                            ParseError::new(
                                ParseErrorKind::ExpectedFunctionBodyAfterMemberInitList,
                                next.clone(),
                            ),
                        );
                        p.push_back_token(next);
                        break;
                    }
                }
            }
            inits
        })
    }

    /// 関数宣言子の後の `= 0`、メンバー初期化子リスト、関数本体
    ///
    /// 本体は読み飛ばすが、その間 `simple` を関数スコープとして通知する。
    fn parse_optional_function_body(&mut self, simple: &Simple) -> Initializer {
        let mut token = self.read_token();
        if token.kind == TokenKind::SingleEqual {
            let (start, end) = self.parse_expression(false);
            return Initializer::Assignment {
                kind: AssignmentType::Expression { start, end },
                equal_sign: token,
            };
        }

        let mut colon = Token::default();
        let mut member_inits = Vec::new();
        if token.kind == TokenKind::SingleColon {
            colon = token;
            member_inits = self.parse_member_initializer_list();
            token = self.read_token();
        }

        if token.kind == TokenKind::OpenCurly {
            self.visor.do_enter(ScopeRef::FunctionBody(simple));
            let close_curly = self.skip_any_scope(&token).unwrap_or_default();
            self.visor.do_exit(ScopeRef::FunctionBody(simple));
            return Initializer::FunctionBody {
                colon,
                member_inits,
                open_curly: token,
                close_curly,
            };
        }

        self.push_back_token(token);
        if colon.is_valid() {
            Initializer::FunctionBody {
                colon,
                member_inits,
                open_curly: Token::default(),
                close_curly: Token::default(),
            }
        } else {
            Initializer::None
        }
    }

    /// テンプレートの型引数のデフォルト（`= Foo<int>`）
    fn parse_optional_type_id_initializer(&mut self) -> Initializer {
        let equal_sign = self.read_token();
        if equal_sign.kind != TokenKind::SingleEqual {
            self.push_back_token(equal_sign);
            return Initializer::None;
        }
        let token = self.peek_token();
        if token.kind == TokenKind::NumericLiteral {
            self.read_token();
            return Initializer::Assignment {
                kind: AssignmentType::Expression {
                    start: token.clone(),
                    end: token,
                },
                equal_sign,
            };
        }
        let pa = ParseActivity::begin(self);
        let mut simple = Simple::default();
        self.parse_specifiers_and_declarators(&mut simple, &SpecDcorMode::TypeID);
        let kind = if pa.error_occurred(self) {
            AssignmentType::Expression {
                start: Token::default(),
                end: Token::default(),
            }
        } else {
            let (decl_specifier_seq, abstract_dcor) = take_type_id(simple);
            AssignmentType::TypeID {
                decl_specifier_seq,
                abstract_dcor,
            }
        };
        Initializer::Assignment { kind, equal_sign }
    }

    /// 変数の初期化子（`= expr`、`{...}`、ビットフィールドの `: width`）
    pub(crate) fn parse_optional_variable_initializer(
        &mut self,
        allow_braced_init: bool,
    ) -> Initializer {
        let token = self.read_token();
        match token.kind {
            TokenKind::OpenCurly if allow_braced_init => {
                self.push_back_token(token);
                let (start, end) = self.parse_expression(false);
                Initializer::Assignment {
                    kind: AssignmentType::Expression { start, end },
                    equal_sign: Token::default(),
                }
            }
            TokenKind::SingleEqual => {
                let (start, end) = self.parse_expression(false);
                Initializer::Assignment {
                    kind: AssignmentType::Expression { start, end },
                    equal_sign: token,
                }
            }
            TokenKind::SingleColon => {
                let (expression_start, expression_end) = self.parse_expression(false);
                Initializer::BitField {
                    colon: token,
                    expression_start,
                    expression_end,
                }
            }
            _ => {
                self.push_back_token(token);
                Initializer::None
            }
        }
    }

    /// 宣言子の並び（指定子の後）
    fn parse_init_declarators(&mut self, simple: &mut Simple, mode: &SpecDcorMode<'_>) {
        if !mode.is_global_or_member() {
            // 引数なら名前付きか抽象の宣言子が1つ。型IDなら抽象宣言子が1つ
            let flags = if mode.is_any_type_id() {
                dcor_flags::ALLOW_ABSTRACT
            } else {
                dcor_flags::ALLOW_NAMED | dcor_flags::ALLOW_ABSTRACT
            };
            let mut init_dcor = InitDeclaratorWithComma::default();
            self.parse_declarator(&mut init_dcor.dcor, None, flags);
            if mode.is_any_param() {
                // テンプレートの型引数はここに来ない
                init_dcor.init = self.parse_optional_variable_initializer(false);
            }
            simple.init_declarators.push(init_dcor);
            return;
        }

        // 名前付きの宣言子が0個以上
        loop {
            let mut dcor = Declarator::default();
            self.parse_declarator(&mut dcor, None, dcor_flags::ALLOW_NAMED);
            if dcor.qid.is_empty() {
                break;
            }
            let is_function = dcor.is_function();
            simple.init_declarators.push(InitDeclaratorWithComma {
                dcor,
                ..Default::default()
            });

            if is_function {
                let init = self.parse_optional_function_body(simple);
                if init.is_function_body() && simple.init_declarators.len() > 1 {
                    let open_punc = simple
                        .init_declarators
                        .last_mut()
                        .and_then(|d| function_at(&mut d.dcor.prod, 0))
                        .map(|f| f.params.open_punc.clone())
                        .unwrap_or_default();
                    self.error(
                        false,
                        ParseError::new(ParseErrorKind::CantMixFunctionDefAndDecl, open_punc),
                    );
                }
                let has_body = init.is_function_body();
                if let Some(last) = simple.init_declarators.last_mut() {
                    last.init = init;
                }
                // 関数本体の後には宣言子を続けない
                if has_body {
                    break;
                }
            } else {
                let init = self.parse_optional_variable_initializer(true);
                if let Some(last) = simple.init_declarators.last_mut() {
                    last.init = init;
                }
            }

            let sep = self.read_token();
            if sep.kind != TokenKind::Comma {
                self.push_back_token(sep);
                break;
            }
            if let Some(last) = simple.init_declarators.last_mut() {
                last.comma = sep;
            }
        }
    }

    /// 基底クラスの並び（`:` の直後から `{` の手前まで）
    fn parse_base_specifier_list(&mut self) -> Vec<BaseSpecifierWithComma> {
        let mut bases: Vec<BaseSpecifierWithComma> = Vec::new();
        loop {
            let mut access_spec = Token::default();
            let token = self.read_token();
            if matches!(token.text.as_str(), "public" | "private" | "protected")
                && token.kind == TokenKind::Identifier
            {
                self.stop_muting_errors();
                access_spec = token;
            } else {
                self.push_back_token(token);
            }

            let base_qid = self.parse_qualified_id(ParseQualifiedMode::RequireComplete);
            if base_qid.unqual.is_empty() {
                break;
            }
            self.stop_muting_errors();
            bases.push(BaseSpecifierWithComma {
                access_spec,
                base_qid,
                comma: Token::default(),
            });

            let punc = self.read_token();
            match punc.kind {
                TokenKind::OpenCurly => {
                    self.push_back_token(punc);
                    break;
                }
                TokenKind::Comma => {
                    if let Some(last) = bases.last_mut() {
                        last.comma = punc;
                    }
                }
                _ => {
                    self.error(
                        true,
                        ParseError::expected(ExpectedToken::CommaOrOpenCurly, punc.clone()),
                    );
                    self.push_back_token(punc);
                    break;
                }
            }
        }
        bases
    }

    /// `struct` / `class` / `union` の後を読む
    fn parse_record_specifier(&mut self, class_key: Token) -> Record {
        let mut record = Record {
            class_key,
            qid: self.parse_qualified_id(ParseQualifiedMode::RequireCompleteOrEmpty),
            ..Default::default()
        };

        let mut token = self.read_token();
        while token.is_ident("final") {
            if record.virt_specifiers.is_empty() {
                record.virt_specifiers.push(token);
            } else {
                self.error(
                    true,
                    ParseError::new(ParseErrorKind::DuplicateVirtSpecifier, token),
                );
            }
            token = self.read_token();
        }

        if token.kind == TokenKind::SingleColon {
            record.colon = token;
            record.base_specifier_list = self.parse_base_specifier_list();
            token = self.read_token();
        }

        if token.kind == TokenKind::OpenCurly {
            record.open_curly = token;
            let class_name = record.qid.get_class_name().to_string();
            self.visor.do_enter(ScopeRef::Record(&record));
            record.close_curly = self.parse_declaration_list(true, &class_name);
            record.visor_decls = self.visor.take_decls();
            self.visor.do_exit(ScopeRef::Record(&record));
        } else {
            self.push_back_token(token);
        }
        record
    }

    /// `enum` の後を読む
    fn parse_enum_specifier(&mut self, enum_key: Token) -> EnumSpecifier {
        let mut en = EnumSpecifier {
            enum_key,
            ..Default::default()
        };
        let token = self.read_token();
        if token.is_ident("class") || token.is_ident("struct") {
            en.class_key = token;
        } else {
            self.push_back_token(token);
        }

        en.qid = self.parse_qualified_id(ParseQualifiedMode::RequireCompleteOrEmpty);

        let sep = self.read_token();
        if sep.kind == TokenKind::SingleColon {
            if en.qid.is_empty() {
                self.error(
                    false,
                    ParseError::new(ParseErrorKind::ScopedEnumRequiresName, sep.clone()),
                );
            }
            en.base_punc = sep;
            en.base = self.parse_qualified_id(ParseQualifiedMode::RequireComplete);
        } else {
            self.push_back_token(sep);
        }

        let open = self.read_token();
        if open.kind == TokenKind::OpenCurly {
            en.open_curly = open;
            self.visor.do_enter(ScopeRef::Enum(&en));
            self.parse_enum_body(&mut en);
            self.visor.do_exit(ScopeRef::Enum(&en));
        } else {
            self.push_back_token(open);
        }
        en
    }

    /// 宣言指定子の並びと、それに続く宣言子を読む
    pub(crate) fn parse_specifiers_and_declarators(
        &mut self,
        simple: &mut Simple,
        mode: &SpecDcorMode<'_>,
    ) {
        let mut type_specifier_index: Option<usize> = None;
        // 型指定子がまだ `unsigned` などの修飾だけか
        let mut modifiers_only = false;
        loop {
            let token = self.read_token();
            if token.kind != TokenKind::Identifier {
                // 宣言子の始まり（`*` や `&` など）
                if type_specifier_index.is_none() {
                    let expected = match mode {
                        // デストラクタの可能性があるので、ここではエラーにしない
                        SpecDcorMode::GlobalOrMember(_) => None,
                        SpecDcorMode::Param => Some(ExpectedToken::ParameterType),
                        SpecDcorMode::TemplateParam => Some(ExpectedToken::TemplateParameterDecl),
                        SpecDcorMode::TypeID => Some(ExpectedToken::TypeSpecifier),
                    };
                    if let Some(expected) = expected {
                        self.error(true, ParseError::expected(expected, token.clone()));
                    }
                }
                self.push_back_token(token);
                self.parse_init_declarators(simple, mode);
                return;
            }

            match token.text.as_str() {
                "extern" => {
                    self.stop_muting_errors();
                    let literal = self.read_token();
                    if literal.kind == TokenKind::StringLiteral {
                        simple.decl_specifier_seq.push(DeclSpecifier::LangLinkage {
                            extern_token: token,
                            literal,
                        });
                    } else {
                        self.push_back_token(literal);
                        simple.decl_specifier_seq.push(DeclSpecifier::Keyword(token));
                    }
                }
                word if KEYWORD_SPECIFIERS.contains(&word) => {
                    self.stop_muting_errors();
                    simple.decl_specifier_seq.push(DeclSpecifier::Keyword(token));
                }
                word if BUILTIN_TYPE_MODIFIERS.contains(&word) => {
                    self.stop_muting_errors();
                    if type_specifier_index.is_none() {
                        type_specifier_index = Some(simple.decl_specifier_seq.len());
                        modifiers_only = true;
                    }
                    simple.decl_specifier_seq.push(DeclSpecifier::Keyword(token));
                }
                "alignas" if mode.is_global_or_member() => {
                    self.stop_muting_errors();
                    let open = self.read_token();
                    if open.kind != TokenKind::OpenParen {
                        self.error(
                            true,
                            ParseError::expected(ExpectedToken::OpenParen, open.clone())
                                .after(token),
                        );
                        self.push_back_token(open);
                        continue;
                    }
                    // 整列の指定は構文木に残さない
                    self.with_accept_flags(TokenKind::OpenParen, |p| p.parse_expression(false));
                    if self.close_scope(&open).is_none() {
                        return;
                    }
                }
                "typedef" if mode.is_global_or_member() => {
                    self.stop_muting_errors();
                    simple.decl_specifier_seq.push(DeclSpecifier::Keyword(token));
                }
                "struct" | "class" | "union" if *mode != SpecDcorMode::TemplateParam => {
                    self.stop_muting_errors();
                    if type_specifier_index.is_some() {
                        self.error(
                            true,
                            ParseError::new(ParseErrorKind::TooManyTypeSpecifiers, token.clone()),
                        );
                    }
                    let record = self.parse_record_specifier(token);
                    type_specifier_index = Some(simple.decl_specifier_seq.len());
                    simple.decl_specifier_seq.push(DeclSpecifier::Record(record));
                }
                "enum" if *mode != SpecDcorMode::TemplateParam => {
                    self.stop_muting_errors();
                    if type_specifier_index.is_some() {
                        self.error(
                            true,
                            ParseError::new(ParseErrorKind::TooManyTypeSpecifiers, token.clone()),
                        );
                    }
                    let en = self.parse_enum_specifier(token);
                    type_specifier_index = Some(simple.decl_specifier_seq.len());
                    simple.decl_specifier_seq.push(DeclSpecifier::Enum(en));
                }
                "operator" if mode.is_global_or_member() && type_specifier_index.is_none() => {
                    self.stop_muting_errors();
                    self.parse_conversion_function(simple, token);
                    return;
                }
                _ => {
                    self.stop_muting_errors();
                    if modifiers_only && COMBINABLE_BUILTIN_TYPES.contains(&token.text.as_str()) {
                        // `unsigned int` や `long double`
                        modifiers_only = false;
                        simple.decl_specifier_seq.push(DeclSpecifier::TypeID {
                            typename: Token::default(),
                            qid: QualifiedID::from_identifier(token),
                            was_assumed: false,
                        });
                        continue;
                    }
                    if type_specifier_index.is_some() {
                        // 型指定子は読んだので、ここからは宣言子
                        self.push_back_token(token);
                        self.parse_init_declarators(simple, mode);
                        return;
                    }
                    if self.parse_type_specifier(simple, mode, token) {
                        return;
                    }
                    type_specifier_index = Some(simple.decl_specifier_seq.len() - 1);
                }
            }
        }
    }

    /// `operator Foo()` 形式の変換関数
    fn parse_conversion_function(&mut self, simple: &mut Simple, keyword: Token) {
        let (decl_specifier_seq, abstract_dcor) = self.parse_conversion_type_id();
        let mut init_dcor = InitDeclaratorWithComma::default();
        init_dcor.dcor.qid.unqual = UnqualifiedID::ConversionFunc {
            keyword,
            decl_specifier_seq,
            abstract_dcor,
        };

        let open = self.peek_token();
        if open.kind != TokenKind::OpenParen {
            simple.init_declarators.push(init_dcor);
            self.error(true, ParseError::expected(ExpectedToken::OpenParen, open));
            return;
        }
        let mut function = FunctionDeclarator::default();
        self.parse_parameter_declaration_list(&mut function.params, false);
        function.qualifiers = self.parse_function_qualifier_seq();
        insert_at(&mut init_dcor.dcor.prod, 0, ProductionKind::Function(function));
        simple.init_declarators.push(init_dcor);
        let init = self.parse_optional_function_body(simple);
        if let Some(last) = simple.init_declarators.last_mut() {
            last.init = init;
        }
    }

    /// 名前による型指定子。宣言全体を読み終えたら真を返す
    ///
    /// 型引数、コンストラクタと判定できた場合は宣言子まで読む。
    fn parse_type_specifier(
        &mut self,
        simple: &mut Simple,
        mode: &SpecDcorMode<'_>,
        token: Token,
    ) -> bool {
        let is_typename = token.text == "typename"
            || (*mode == SpecDcorMode::TemplateParam && token.text == "class");
        let mut typename = Token::default();
        let qid;
        if is_typename {
            let mut ellipsis = Token::default();
            let next = self.read_token();
            if next.kind == TokenKind::Ellipsis {
                ellipsis = next;
            } else {
                self.push_back_token(next);
            }
            let name = self.parse_qualified_id(ParseQualifiedMode::RequireCompleteOrEmpty);
            if *mode == SpecDcorMode::TemplateParam
                && simple.decl_specifier_seq.is_empty()
                && name.nested_name.is_empty()
            {
                self.parse_type_parameter(simple, token, ellipsis, name);
                return true;
            }
            if ellipsis.is_valid() {
                self.error(
                    true,
                    ParseError::expected(ExpectedToken::QualifiedID, ellipsis),
                );
            }
            typename = token;
            qid = name;
        } else {
            self.push_back_token(token);
            qid = self.parse_qualified_id(ParseQualifiedMode::RequireComplete);
        }

        if let SpecDcorMode::GlobalOrMember(class_name) = mode
            && !typename.is_valid()
            && looks_like_ctor_dtor(class_name, &qid)
        {
            // コンストラクタとして試す。`Foo(bar())` のような場合は失敗して戻る
            let rp = RestorePoint::begin(self);
            let mut ctor_prod: Chain = None;
            let mut depth = 0;
            self.parse_parameter_list(&mut ctor_prod, &mut depth);
            if !rp.error_occurred(self) {
                rp.cancel(self);
                simple.init_declarators.push(InitDeclaratorWithComma {
                    dcor: Declarator {
                        prod: ctor_prod,
                        qid,
                    },
                    ..Default::default()
                });
                let init = self.parse_optional_function_body(simple);
                if let Some(last) = simple.init_declarators.last_mut() {
                    last.init = init;
                }
                return true;
            }
            rp.backtrack(self);
            rp.cancel(self);
        }

        // 暗黙の int はないので、これは型指定子
        if typename.is_valid() && qid.nested_name.is_empty() {
            self.error(
                true,
                ParseError::expected(ExpectedToken::NestedNamePrefix, qid.get_first_token()),
            );
        }
        simple.decl_specifier_seq.push(DeclSpecifier::TypeID {
            typename,
            qid,
            was_assumed: false,
        });
        false
    }

    /// テンプレートの型引数（`typename T = int`）
    fn parse_type_parameter(
        &mut self,
        simple: &mut Simple,
        keyword: Token,
        ellipsis: Token,
        name: QualifiedID,
    ) {
        let identifier = match &name.unqual {
            UnqualifiedID::Identifier { name } => name.clone(),
            UnqualifiedID::Empty => Token::default(),
            other => {
                self.error(
                    true,
                    ParseError::expected(ExpectedToken::Identifier, other.get_first_token()),
                );
                return;
            }
        };
        simple.decl_specifier_seq.push(DeclSpecifier::TypeParam {
            keyword,
            ellipsis,
            identifier,
        });
        let init = self.parse_optional_type_id_initializer();
        simple.init_declarators.push(InitDeclaratorWithComma {
            dcor: Declarator {
                prod: None,
                qid: name,
            },
            init,
            comma: Token::default(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::chain_iter;
    use crate::location::VisitedFiles;
    use crate::preprocessor::{PPConfig, Preprocessor};
    use crate::supervisor::CollectingSupervisor;

    fn parse_decl(src: &str, class_name: &str) -> (Simple, usize) {
        let mut files = VisitedFiles::new();
        let mut visor = CollectingSupervisor::default();
        let simple = {
            let mut pp = Preprocessor::new(&mut files, PPConfig::default());
            pp.push_source("decl.h", src);
            let mut parser = Parser::new(pp, &mut visor);
            let mut simple = Simple::default();
            parser.parse_specifiers_and_declarators(
                &mut simple,
                &SpecDcorMode::GlobalOrMember(class_name),
            );
            simple
        };
        (simple, visor.errors.len())
    }

    fn shape(simple: &Simple) -> Vec<&'static str> {
        chain_iter(&simple.init_declarators[0].dcor.prod)
            .map(|p| match &p.kind {
                ProductionKind::Parenthesized { .. } => "paren",
                ProductionKind::PointerTo { .. } => "ptr",
                ProductionKind::ArrayOf { .. } => "array",
                ProductionKind::Function(_) => "func",
                ProductionKind::Qualifier { .. } => "qual",
            })
            .collect()
    }

    #[test]
    fn test_declarator_shapes() {
        let (simple, errors) = parse_decl("int *x[3];", "");
        assert_eq!(errors, 0);
        assert_eq!(shape(&simple), vec!["array", "ptr"]);

        let (simple, _) = parse_decl("int (*x)[3];", "");
        assert_eq!(shape(&simple), vec!["paren", "ptr", "array"]);

        let (simple, _) = parse_decl("int (*x)();", "");
        assert_eq!(shape(&simple), vec!["paren", "ptr", "func"]);

        let (simple, _) = parse_decl("int *(*x)[3];", "");
        assert_eq!(shape(&simple), vec!["paren", "ptr", "array", "ptr"]);

        let (simple, _) = parse_decl("int x[2][3];", "");
        assert_eq!(shape(&simple), vec!["array", "array"]);
    }

    #[test]
    fn test_builtin_type_modifiers() {
        let cases = [
            ("unsigned n;", "n", 1),
            ("long long x;", "x", 2),
            ("signed char c;", "c", 2),
            ("short int s;", "s", 2),
            ("long double d;", "d", 2),
            ("unsigned long y;", "y", 2),
            ("unsigned long int z;", "z", 3),
            ("const unsigned k = 0;", "k", 2),
        ];
        for (src, name, specifiers) in cases {
            let (simple, errors) = parse_decl(src, "");
            assert_eq!(errors, 0, "{}", src);
            assert_eq!(simple.decl_specifier_seq.len(), specifiers, "{}", src);
            assert_eq!(simple.init_declarators.len(), 1, "{}", src);
            assert_eq!(simple.init_declarators[0].dcor.qid.to_string(), name, "{}", src);
        }
    }

    #[test]
    fn test_function_pointer_with_qualifier() {
        let (simple, errors) = parse_decl("void (*x)() const;", "");
        assert_eq!(errors, 0);
        let prods: Vec<_> = chain_iter(&simple.init_declarators[0].dcor.prod).collect();
        let ProductionKind::Function(function) = &prods[2].kind else {
            panic!("expected a function production");
        };
        assert_eq!(function.qualifiers.tokens[0].text, "const");
    }

    #[test]
    fn test_reference_to_const_pointer() {
        let (simple, errors) = parse_decl("int * const & r;", "");
        assert_eq!(errors, 0);
        assert_eq!(shape(&simple), vec!["ptr", "qual", "ptr"]);
    }

    #[test]
    fn test_constructor_disambiguation() {
        let (simple, errors) = parse_decl("Foo(int);", "Foo");
        assert_eq!(errors, 0);
        assert!(simple.decl_specifier_seq.is_empty());
        assert_eq!(simple.init_declarators[0].dcor.qid.to_string(), "Foo");
        assert!(simple.init_declarators[0].dcor.is_function());

        let (simple, _) = parse_decl("Baz(int);", "Foo");
        assert!(matches!(
            simple.decl_specifier_seq[0],
            DeclSpecifier::TypeID { .. }
        ));
        assert_eq!(simple.init_declarators[0].dcor.qid.to_string(), "int");
    }

    #[test]
    fn test_out_of_line_constructor_with_member_inits() {
        let (simple, errors) = parse_decl("Foo::Foo(int a) : x(a), y{2} {}", "");
        assert_eq!(errors, 0);
        let Initializer::FunctionBody { member_inits, .. } = &simple.init_declarators[0].init
        else {
            panic!("expected a function body");
        };
        assert_eq!(member_inits.len(), 2);
        assert_eq!(member_inits[1].qid.to_string(), "y");
    }

    #[test]
    fn test_conversion_and_operator() {
        let (simple, errors) = parse_decl("operator const char*() const;", "Foo");
        assert_eq!(errors, 0);
        assert!(matches!(
            simple.init_declarators[0].dcor.qid.unqual,
            UnqualifiedID::ConversionFunc { .. }
        ));

        let (simple, errors) = parse_decl("operator unsigned long long() const;", "Foo");
        assert_eq!(errors, 0);
        let UnqualifiedID::ConversionFunc {
            decl_specifier_seq,
            ..
        } = &simple.init_declarators[0].dcor.qid.unqual
        else {
            panic!("expected a conversion function");
        };
        assert_eq!(decl_specifier_seq.len(), 3);

        let (simple, errors) = parse_decl("bool operator==(const Foo& other) const;", "Foo");
        assert_eq!(errors, 0);
        assert_eq!(simple.init_declarators[0].dcor.qid.to_string(), "operator==");
    }

    #[test]
    fn test_multiple_declarators_and_bitfield() {
        let (simple, errors) = parse_decl("unsigned int a : 3, b = 4;", "");
        assert_eq!(errors, 0);
        assert_eq!(simple.init_declarators.len(), 2);
        assert!(matches!(
            simple.init_declarators[0].init,
            Initializer::BitField { .. }
        ));
        assert_eq!(simple.init_declarators[0].comma.kind, TokenKind::Comma);
    }

    #[test]
    fn test_too_many_type_specifiers() {
        let (_, errors) = parse_decl("struct A struct B x;", "");
        assert_eq!(errors, 1);
    }

    #[test]
    fn test_looks_like_ctor_dtor() {
        let name = |text: &str| Token::new(0, TokenKind::Identifier, text);
        let qid = QualifiedID {
            nested_name: Vec::new(),
            unqual: UnqualifiedID::Destructor {
                tilde: Token::new(0, TokenKind::Tilde, "~"),
                name: name("Foo"),
            },
        };
        assert!(looks_like_ctor_dtor("Foo", &qid));
        assert!(!looks_like_ctor_dtor("Bar", &qid));
        assert!(!looks_like_ctor_dtor("", &qid));
    }
}
