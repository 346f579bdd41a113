//! 構文木のノード定義
//!
//! 各ノードは子を排他的に所有する木構造で、親へのポインタは持たない。
//! 宣言子は `DeclaratorProduction` の単方向リストで、先頭が最も外側になる。

use serde::Serialize;

use crate::token::Token;

/// 関数呼び出し形式の括弧（`static_assert(...)` の引数など）
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpressionCall {
    pub open_paren: Token,
    pub close_paren: Token,
    pub arguments: Vec<ExpressionWithComma>,
}

/// 式。構文木では評価せず、範囲だけを保持する
#[derive(Debug, Clone, Default, Serialize)]
pub enum Expression {
    #[default]
    Empty,
    Range {
        start: Token,
        end: Token,
    },
    Call(ExpressionCall),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpressionWithComma {
    pub expr: Expression,
    pub comma: Token,
}

/// ネスト名指定子の要素
#[derive(Debug, Clone, Serialize)]
pub enum NestedNameComponentType {
    IdentifierOrTemplated {
        name: Token,
        /// 無効ならテンプレートではない
        open_angled: Token,
        close_angled: Token,
        args: Vec<TemplateArgumentWithComma>,
    },
    DeclType {
        keyword: Token,
        open_paren: Token,
        close_paren: Token,
    },
}

/// ネスト名指定子の1要素（`Foo::` や `Bar<int>::`）
#[derive(Debug, Clone, Serialize)]
pub struct NestedNameComponent {
    pub kind: NestedNameComponentType,
    pub sep: Token,
}

impl NestedNameComponent {
    pub fn get_first_token(&self) -> Token {
        match &self.kind {
            NestedNameComponentType::IdentifierOrTemplated { name, .. } => name.clone(),
            NestedNameComponentType::DeclType { keyword, .. } => keyword.clone(),
        }
    }
}

/// 非修飾ID
#[derive(Debug, Clone, Default, Serialize)]
pub enum UnqualifiedID {
    #[default]
    Empty,
    Identifier {
        name: Token,
    },
    TemplateID {
        name: Token,
        open_angled: Token,
        close_angled: Token,
        args: Vec<TemplateArgumentWithComma>,
    },
    DeclType {
        keyword: Token,
        open_paren: Token,
        close_paren: Token,
    },
    Destructor {
        tilde: Token,
        name: Token,
    },
    OperatorFunc {
        keyword: Token,
        punc: Token,
        punc2: Token,
    },
    ConversionFunc {
        keyword: Token,
        decl_specifier_seq: Vec<DeclSpecifier>,
        abstract_dcor: Option<Box<DeclaratorProduction>>,
    },
}

impl UnqualifiedID {
    pub fn is_empty(&self) -> bool {
        matches!(self, UnqualifiedID::Empty)
    }

    /// コンストラクタ・デストラクタとして見たときのクラス名
    pub fn get_ctor_dtor_name(&self) -> &str {
        match self {
            UnqualifiedID::Identifier { name }
            | UnqualifiedID::Destructor { name, .. }
            | UnqualifiedID::TemplateID { name, .. } => &name.text,
            _ => "",
        }
    }

    pub fn get_first_token(&self) -> Token {
        match self {
            UnqualifiedID::Empty => Token::default(),
            UnqualifiedID::Identifier { name } => name.clone(),
            UnqualifiedID::TemplateID { name, .. } => name.clone(),
            UnqualifiedID::DeclType { keyword, .. } => keyword.clone(),
            UnqualifiedID::Destructor { tilde, .. } => tilde.clone(),
            UnqualifiedID::OperatorFunc { keyword, .. } => keyword.clone(),
            UnqualifiedID::ConversionFunc { keyword, .. } => keyword.clone(),
        }
    }
}

/// 修飾ID
#[derive(Debug, Clone, Default, Serialize)]
pub struct QualifiedID {
    pub nested_name: Vec<NestedNameComponent>,
    pub unqual: UnqualifiedID,
}

impl QualifiedID {
    /// 識別子1つだけのID
    pub fn from_identifier(name: Token) -> Self {
        Self {
            nested_name: Vec::new(),
            unqual: UnqualifiedID::Identifier { name },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nested_name.is_empty() && self.unqual.is_empty()
    }

    pub fn is_nested_name_only(&self) -> bool {
        !self.nested_name.is_empty() && self.unqual.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        !self.unqual.is_empty()
    }

    pub fn get_class_name(&self) -> &str {
        match &self.unqual {
            UnqualifiedID::Identifier { name } | UnqualifiedID::TemplateID { name, .. } => {
                &name.text
            }
            _ => "",
        }
    }

    /// エラー位置の報告用
    pub fn get_first_token(&self) -> Token {
        match self.nested_name.first() {
            Some(comp) => comp.get_first_token(),
            None => self.unqual.get_first_token(),
        }
    }
}

impl std::fmt::Display for QualifiedID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for comp in &self.nested_name {
            match &comp.kind {
                NestedNameComponentType::IdentifierOrTemplated {
                    name, open_angled, ..
                } => {
                    write!(f, "{}", name.text)?;
                    if open_angled.is_valid() {
                        write!(f, "<>")?;
                    }
                }
                NestedNameComponentType::DeclType { .. } => write!(f, "decltype()")?,
            }
            write!(f, "::")?;
        }
        match &self.unqual {
            UnqualifiedID::Empty => write!(f, "(empty)"),
            UnqualifiedID::Identifier { name } => write!(f, "{}", name.text),
            UnqualifiedID::TemplateID {
                name,
                open_angled,
                close_angled,
                ..
            } => write!(f, "{}{}{}", name.text, open_angled.text, close_angled.text),
            UnqualifiedID::DeclType { .. } => write!(f, "decltype()"),
            UnqualifiedID::Destructor { tilde, name } => write!(f, "{}{}", tilde.text, name.text),
            UnqualifiedID::OperatorFunc {
                keyword,
                punc,
                punc2,
            } => write!(f, "{}{}{}", keyword.text, punc.text, punc2.text),
            UnqualifiedID::ConversionFunc { .. } => write!(f, "(conversion)"),
        }
    }
}

/// テンプレート引数
#[derive(Debug, Clone, Serialize)]
pub enum TemplateArgument {
    /// 型として解釈できなかった引数のトークン範囲
    Unknown { start_token: Token, end_token: Token },
    TypeID {
        decl_specifier_seq: Vec<DeclSpecifier>,
        abstract_dcor: Option<Box<DeclaratorProduction>>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateArgumentWithComma {
    pub kind: TemplateArgument,
    pub comma: Token,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BaseSpecifierWithComma {
    pub access_spec: Token,
    pub base_qid: QualifiedID,
    pub comma: Token,
}

/// `struct` / `class` / `union` 指定子
#[derive(Debug, Clone, Default, Serialize)]
pub struct Record {
    pub class_key: Token,
    pub qid: QualifiedID,
    pub virt_specifiers: Vec<Token>,
    pub colon: Token,
    pub base_specifier_list: Vec<BaseSpecifierWithComma>,
    pub open_curly: Token,
    pub close_curly: Token,
    /// スーパーバイザーが集めたメンバー宣言
    pub visor_decls: Vec<Declaration>,
}

/// `enum` 指定子
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnumSpecifier {
    pub enum_key: Token,
    pub class_key: Token,
    pub qid: QualifiedID,
    pub base_punc: Token,
    pub base: QualifiedID,
    pub open_curly: Token,
    pub close_curly: Token,
    pub enumerators: Vec<InitEnumeratorWithComma>,
}

/// 宣言指定子
#[derive(Debug, Clone, Serialize)]
pub enum DeclSpecifier {
    Keyword(Token),
    LangLinkage {
        extern_token: Token,
        literal: Token,
    },
    Record(Record),
    Enum(EnumSpecifier),
    TypeID {
        /// `typename` が前置されていればそのトークン
        typename: Token,
        qid: QualifiedID,
        was_assumed: bool,
    },
    TypeParam {
        /// `typename` または `class`
        keyword: Token,
        ellipsis: Token,
        identifier: Token,
    },
    Ellipsis(Token),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParamDeclarationList {
    pub open_punc: Token,
    pub close_punc: Token,
    pub params: Vec<ParamDeclarationWithComma>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FunctionQualifierSeq {
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FunctionDeclarator {
    pub params: ParamDeclarationList,
    pub qualifiers: FunctionQualifierSeq,
    pub arrow: Token,
    pub trailing_ret_type: QualifiedID,
}

/// 宣言子の1段
#[derive(Debug, Clone, Serialize)]
pub enum ProductionKind {
    Parenthesized {
        open_paren: Token,
        close_paren: Token,
    },
    /// `*`, `&`, `&&`。`nested_name` があればメンバーポインタ
    PointerTo {
        nested_name: Vec<NestedNameComponent>,
        punc: Token,
    },
    ArrayOf {
        open_square: Token,
        close_square: Token,
        size: Expression,
    },
    Function(FunctionDeclarator),
    Qualifier {
        keyword: Token,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct DeclaratorProduction {
    pub kind: ProductionKind,
    pub target: Option<Box<DeclaratorProduction>>,
}

/// 宣言子チェーン（先頭が最も外側）
pub type Chain = Option<Box<DeclaratorProduction>>;

/// 先頭から `depth` 段目の差し込み口
pub fn slot_at(mut slot: &mut Chain, depth: usize) -> &mut Chain {
    for _ in 0..depth {
        match slot {
            Some(node) => slot = &mut node.target,
            None => break,
        }
    }
    slot
}

/// `depth` 段目に新しい段を差し込む
pub fn insert_at(chain: &mut Chain, depth: usize, kind: ProductionKind) {
    let slot = slot_at(chain, depth);
    let target = slot.take();
    *slot = Some(Box::new(DeclaratorProduction { kind, target }));
}

pub fn chain_len(chain: &Chain) -> usize {
    let mut n = 0;
    let mut cur = chain;
    while let Some(node) = cur {
        n += 1;
        cur = &node.target;
    }
    n
}

/// 先頭の段を外す
pub fn pop_head(chain: &mut Chain) {
    if let Some(mut head) = chain.take() {
        *chain = head.target.take();
    }
}

/// チェーンを外側から順に辿る
pub fn chain_iter(chain: &Chain) -> impl Iterator<Item = &DeclaratorProduction> {
    std::iter::successors(chain.as_deref(), |p| p.target.as_deref())
}

impl DeclaratorProduction {
    pub fn is_function(&self) -> bool {
        matches!(self.kind, ProductionKind::Function(_))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Declarator {
    pub prod: Chain,
    pub qid: QualifiedID,
}

impl Declarator {
    pub fn is_function(&self) -> bool {
        self.prod.as_ref().is_some_and(|p| p.is_function())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MemberInitializerWithComma {
    pub qid: QualifiedID,
    pub open_punc: Token,
    pub close_punc: Token,
    pub comma: Token,
}

/// `=` の右辺
#[derive(Debug, Clone, Serialize)]
pub enum AssignmentType {
    Expression {
        start: Token,
        end: Token,
    },
    TypeID {
        decl_specifier_seq: Vec<DeclSpecifier>,
        abstract_dcor: Chain,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub enum Initializer {
    #[default]
    None,
    Assignment {
        kind: AssignmentType,
        equal_sign: Token,
    },
    FunctionBody {
        colon: Token,
        member_inits: Vec<MemberInitializerWithComma>,
        open_curly: Token,
        close_curly: Token,
    },
    BitField {
        colon: Token,
        expression_start: Token,
        expression_end: Token,
    },
}

impl Initializer {
    pub fn is_function_body(&self) -> bool {
        matches!(self, Initializer::FunctionBody { .. })
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InitDeclaratorWithComma {
    pub dcor: Declarator,
    pub init: Initializer,
    pub comma: Token,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InitEnumeratorWithComma {
    pub identifier: Token,
    pub init: Initializer,
    pub comma: Token,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParamDeclarationWithComma {
    pub decl_specifier_seq: Vec<DeclSpecifier>,
    /// 抽象宣言子でもよい
    pub dcor: Declarator,
    pub init: Initializer,
    pub comma: Token,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Namespace {
    pub keyword: Token,
    pub qid: QualifiedID,
    pub open_curly: Token,
    pub close_curly: Token,
    pub visor_decls: Vec<Declaration>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Template {
    pub keyword: Token,
    pub params: ParamDeclarationList,
    pub visor_decl: Option<Box<Declaration>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Simple {
    pub decl_specifier_seq: Vec<DeclSpecifier>,
    pub init_declarators: Vec<InitDeclaratorWithComma>,
    pub semicolon: Token,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Linkage {
    pub extern_token: Token,
    pub literal: Token,
    pub open_curly: Token,
    pub close_curly: Token,
    pub visor_decls: Vec<Declaration>,
}

/// 宣言
#[derive(Debug, Clone, Serialize)]
pub enum Declaration {
    Namespace(Namespace),
    Template(Template),
    Simple(Simple),
    AccessSpecifier {
        keyword: Token,
        colon: Token,
    },
    StaticAssert {
        keyword: Token,
        arg_list: ExpressionCall,
        semicolon: Token,
    },
    UsingDirective {
        using: Token,
        namespace: Token,
        qid: QualifiedID,
        semicolon: Token,
    },
    Alias {
        using: Token,
        name: Token,
        equals: Token,
        decl_specifier_seq: Vec<DeclSpecifier>,
        dcor: Declarator,
        semicolon: Token,
    },
    Linkage(Linkage),
    Empty {
        semicolon: Token,
    },
}

/// 翻訳単位（構文木の根）
#[derive(Debug, Clone, Default, Serialize)]
pub struct TranslationUnit {
    pub visor_decls: Vec<Declaration>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    fn star() -> ProductionKind {
        ProductionKind::PointerTo {
            nested_name: Vec::new(),
            punc: Token::new(0, TokenKind::Star, "*"),
        }
    }

    fn array() -> ProductionKind {
        ProductionKind::ArrayOf {
            open_square: Token::default(),
            close_square: Token::default(),
            size: Expression::Empty,
        }
    }

    #[test]
    fn test_chain_insertion() {
        let mut chain: Chain = None;
        insert_at(&mut chain, 0, star());
        insert_at(&mut chain, 0, array());
        assert_eq!(chain_len(&chain), 2);
        let kinds: Vec<_> = chain_iter(&chain)
            .map(|p| matches!(p.kind, ProductionKind::ArrayOf { .. }))
            .collect();
        assert_eq!(kinds, vec![true, false]);

        insert_at(&mut chain, 5, array());
        assert_eq!(chain_len(&chain), 3);
        pop_head(&mut chain);
        assert_eq!(chain_len(&chain), 2);
    }

    #[test]
    fn test_qualified_id_to_string() {
        let qid = QualifiedID {
            nested_name: vec![NestedNameComponent {
                kind: NestedNameComponentType::IdentifierOrTemplated {
                    name: Token::new(0, TokenKind::Identifier, "Foo"),
                    open_angled: Token::new(3, TokenKind::OpenAngle, "<"),
                    close_angled: Token::new(7, TokenKind::CloseAngle, ">"),
                    args: Vec::new(),
                },
                sep: Token::new(8, TokenKind::DoubleColon, "::"),
            }],
            unqual: UnqualifiedID::Destructor {
                tilde: Token::new(10, TokenKind::Tilde, "~"),
                name: Token::new(11, TokenKind::Identifier, "Foo"),
            },
        };
        assert_eq!(qid.to_string(), "Foo<>::~Foo");
        assert_eq!(qid.get_first_token().text, "Foo");
        assert_eq!(qid.unqual.get_ctor_dtor_name(), "Foo");
        assert!(qid.is_complete());
        assert_eq!(QualifiedID::default().to_string(), "(empty)");
    }
}
