//! 構文木のダンプ
//!
//! 字下げしたテキスト形式と、serde による JSON 形式で出力する。
//! テキスト形式ではトークンを `file(line, col): "text"`、修飾IDを
//! その文字列表現で出力する。

use std::io::{Result, Write};

use crate::grammar::*;
use crate::location::VisitedFiles;
use crate::token::{Token, TokenKind};

/// 構文木の字下げ出力プリンター
pub struct TreePrinter<'a, W: Write> {
    writer: W,
    files: Option<&'a VisitedFiles>,
    indent: usize,
}

impl<'a, W: Write> TreePrinter<'a, W> {
    /// 新しいプリンターを作成。`files` があればトークンに位置を付ける
    pub fn new(writer: W, files: Option<&'a VisitedFiles>) -> Self {
        Self {
            writer,
            files,
            indent: 0,
        }
    }

    /// 翻訳単位を出力
    pub fn print_translation_unit(&mut self, tu: &TranslationUnit) -> Result<()> {
        self.open("TranslationUnit")?;
        self.list("visor_decls", &tu.visor_decls, Self::print_declaration)?;
        self.close();
        Ok(())
    }

    /// 宣言を出力
    pub fn print_declaration(&mut self, decl: &Declaration) -> Result<()> {
        match decl {
            Declaration::Namespace(ns) => {
                self.open("Declaration::Namespace")?;
                self.token_field("keyword", &ns.keyword)?;
                self.qid_field("qid", &ns.qid)?;
                self.token_field("open_curly", &ns.open_curly)?;
                self.token_field("close_curly", &ns.close_curly)?;
                self.list("visor_decls", &ns.visor_decls, Self::print_declaration)?;
            }
            Declaration::Template(tmpl) => {
                self.open("Declaration::Template")?;
                self.token_field("keyword", &tmpl.keyword)?;
                self.field("params")?;
                self.print_param_list(&tmpl.params)?;
                self.field("visor_decl")?;
                match &tmpl.visor_decl {
                    Some(inner) => self.print_declaration(inner)?,
                    None => writeln!(self.writer, "(null)")?,
                }
            }
            Declaration::Simple(simple) => {
                self.open("Declaration::Simple")?;
                self.simple_fields(simple)?;
            }
            Declaration::AccessSpecifier { keyword, colon } => {
                self.open("Declaration::AccessSpecifier")?;
                self.token_field("keyword", keyword)?;
                self.token_field("colon", colon)?;
            }
            Declaration::StaticAssert {
                keyword,
                arg_list,
                semicolon,
            } => {
                self.open("Declaration::StaticAssert")?;
                self.token_field("keyword", keyword)?;
                self.field("arg_list")?;
                self.print_expression_call(arg_list)?;
                self.token_field("semicolon", semicolon)?;
            }
            Declaration::UsingDirective {
                using,
                namespace,
                qid,
                semicolon,
            } => {
                self.open("Declaration::UsingDirective")?;
                self.token_field("using", using)?;
                self.token_field("namespace", namespace)?;
                self.qid_field("qid", qid)?;
                self.token_field("semicolon", semicolon)?;
            }
            Declaration::Alias {
                using,
                name,
                equals,
                decl_specifier_seq,
                dcor,
                semicolon,
            } => {
                self.open("Declaration::Alias")?;
                self.token_field("using", using)?;
                self.token_field("name", name)?;
                self.token_field("equals", equals)?;
                self.list(
                    "decl_specifier_seq",
                    decl_specifier_seq,
                    Self::print_decl_specifier,
                )?;
                self.field("dcor")?;
                self.print_declarator(dcor)?;
                self.token_field("semicolon", semicolon)?;
            }
            Declaration::Linkage(linkage) => {
                self.open("Declaration::Linkage")?;
                self.token_field("extern_token", &linkage.extern_token)?;
                self.token_field("literal", &linkage.literal)?;
                self.token_field("open_curly", &linkage.open_curly)?;
                self.token_field("close_curly", &linkage.close_curly)?;
                self.list("visor_decls", &linkage.visor_decls, Self::print_declaration)?;
            }
            Declaration::Empty { semicolon } => {
                self.open("Declaration::Empty")?;
                self.token_field("semicolon", semicolon)?;
            }
        }
        self.close();
        Ok(())
    }

    /// 単純宣言を出力（`parse_simple_declaration` の結果用）
    pub fn print_simple(&mut self, simple: &Simple) -> Result<()> {
        self.open("Simple")?;
        self.simple_fields(simple)?;
        self.close();
        Ok(())
    }

    fn simple_fields(&mut self, simple: &Simple) -> Result<()> {
        self.list(
            "decl_specifier_seq",
            &simple.decl_specifier_seq,
            Self::print_decl_specifier,
        )?;
        self.list(
            "init_declarators",
            &simple.init_declarators,
            Self::print_init_declarator,
        )?;
        self.token_field("semicolon", &simple.semicolon)
    }

    fn print_decl_specifier(&mut self, spec: &DeclSpecifier) -> Result<()> {
        match spec {
            DeclSpecifier::Keyword(token) => {
                self.open("DeclSpecifier::Keyword")?;
                self.token_field("token", token)?;
            }
            DeclSpecifier::LangLinkage {
                extern_token,
                literal,
            } => {
                self.open("DeclSpecifier::LangLinkage")?;
                self.token_field("extern_token", extern_token)?;
                self.token_field("literal", literal)?;
            }
            DeclSpecifier::Record(record) => {
                self.open("DeclSpecifier::Record")?;
                self.token_field("class_key", &record.class_key)?;
                self.qid_field("qid", &record.qid)?;
                self.list("virt_specifiers", &record.virt_specifiers, Self::print_token)?;
                self.token_field("colon", &record.colon)?;
                self.list(
                    "base_specifier_list",
                    &record.base_specifier_list,
                    Self::print_base_specifier,
                )?;
                self.token_field("open_curly", &record.open_curly)?;
                self.token_field("close_curly", &record.close_curly)?;
                self.list("visor_decls", &record.visor_decls, Self::print_declaration)?;
            }
            DeclSpecifier::Enum(en) => {
                self.open("DeclSpecifier::Enum")?;
                self.token_field("enum_key", &en.enum_key)?;
                self.token_field("class_key", &en.class_key)?;
                self.qid_field("qid", &en.qid)?;
                self.token_field("base_punc", &en.base_punc)?;
                self.qid_field("base", &en.base)?;
                self.token_field("open_curly", &en.open_curly)?;
                self.token_field("close_curly", &en.close_curly)?;
                self.list("enumerators", &en.enumerators, Self::print_enumerator)?;
            }
            DeclSpecifier::TypeID {
                typename,
                qid,
                was_assumed,
            } => {
                self.open("DeclSpecifier::TypeID")?;
                self.token_field("typename", typename)?;
                self.qid_field("qid", qid)?;
                self.field("was_assumed")?;
                writeln!(self.writer, "{}", was_assumed)?;
            }
            DeclSpecifier::TypeParam {
                keyword,
                ellipsis,
                identifier,
            } => {
                self.open("DeclSpecifier::TypeParam")?;
                self.token_field("keyword", keyword)?;
                self.token_field("ellipsis", ellipsis)?;
                self.token_field("identifier", identifier)?;
            }
            DeclSpecifier::Ellipsis(token) => {
                self.open("DeclSpecifier::Ellipsis")?;
                self.token_field("token", token)?;
            }
        }
        self.close();
        Ok(())
    }

    fn print_base_specifier(&mut self, base: &BaseSpecifierWithComma) -> Result<()> {
        self.open("BaseSpecifierWithComma")?;
        self.token_field("access_spec", &base.access_spec)?;
        self.qid_field("base_qid", &base.base_qid)?;
        self.token_field("comma", &base.comma)?;
        self.close();
        Ok(())
    }

    fn print_enumerator(&mut self, enumerator: &InitEnumeratorWithComma) -> Result<()> {
        self.open("InitEnumeratorWithComma")?;
        self.token_field("identifier", &enumerator.identifier)?;
        self.field("init")?;
        self.print_initializer(&enumerator.init)?;
        self.token_field("comma", &enumerator.comma)?;
        self.close();
        Ok(())
    }

    fn print_init_declarator(&mut self, init_dcor: &InitDeclaratorWithComma) -> Result<()> {
        self.open("InitDeclaratorWithComma")?;
        self.field("dcor")?;
        self.print_declarator(&init_dcor.dcor)?;
        self.field("init")?;
        self.print_initializer(&init_dcor.init)?;
        self.token_field("comma", &init_dcor.comma)?;
        self.close();
        Ok(())
    }

    fn print_declarator(&mut self, dcor: &Declarator) -> Result<()> {
        self.open("Declarator")?;
        self.field("prod")?;
        self.print_production(&dcor.prod)?;
        self.qid_field("qid", &dcor.qid)?;
        self.close();
        Ok(())
    }

    fn print_production(&mut self, chain: &Chain) -> Result<()> {
        let Some(prod) = chain else {
            return writeln!(self.writer, "(null)");
        };
        match &prod.kind {
            ProductionKind::Parenthesized {
                open_paren,
                close_paren,
            } => {
                self.open("DeclaratorProduction::Parenthesized")?;
                self.token_field("open_paren", open_paren)?;
                self.token_field("close_paren", close_paren)?;
            }
            ProductionKind::PointerTo { nested_name, punc } => {
                self.open("DeclaratorProduction::PointerTo")?;
                let prefix = QualifiedID {
                    nested_name: nested_name.clone(),
                    unqual: UnqualifiedID::Empty,
                };
                if !nested_name.is_empty() {
                    self.qid_field("nested_name", &prefix)?;
                }
                self.token_field("punc", punc)?;
            }
            ProductionKind::ArrayOf {
                open_square,
                close_square,
                size,
            } => {
                self.open("DeclaratorProduction::ArrayOf")?;
                self.token_field("open_square", open_square)?;
                self.token_field("close_square", close_square)?;
                self.field("size")?;
                self.print_expression(size)?;
            }
            ProductionKind::Function(function) => {
                self.open("DeclaratorProduction::Function")?;
                self.field("params")?;
                self.print_param_list(&function.params)?;
                self.list(
                    "qualifiers",
                    &function.qualifiers.tokens,
                    Self::print_token,
                )?;
                self.token_field("arrow", &function.arrow)?;
                self.qid_field("trailing_ret_type", &function.trailing_ret_type)?;
            }
            ProductionKind::Qualifier { keyword } => {
                self.open("DeclaratorProduction::Qualifier")?;
                self.token_field("keyword", keyword)?;
            }
        }
        self.field("target")?;
        self.print_production(&prod.target)?;
        self.close();
        Ok(())
    }

    fn print_param_list(&mut self, params: &ParamDeclarationList) -> Result<()> {
        self.open("ParamDeclarationList")?;
        self.token_field("open_punc", &params.open_punc)?;
        self.list("params", &params.params, Self::print_param)?;
        self.token_field("close_punc", &params.close_punc)?;
        self.close();
        Ok(())
    }

    fn print_param(&mut self, param: &ParamDeclarationWithComma) -> Result<()> {
        self.open("ParamDeclarationWithComma")?;
        self.list(
            "decl_specifier_seq",
            &param.decl_specifier_seq,
            Self::print_decl_specifier,
        )?;
        self.field("dcor")?;
        self.print_declarator(&param.dcor)?;
        self.field("init")?;
        self.print_initializer(&param.init)?;
        self.token_field("comma", &param.comma)?;
        self.close();
        Ok(())
    }

    fn print_initializer(&mut self, init: &Initializer) -> Result<()> {
        match init {
            Initializer::None => {
                self.open("Initializer::None")?;
            }
            Initializer::Assignment { kind, equal_sign } => {
                self.open("Initializer::Assignment")?;
                self.token_field("equal_sign", equal_sign)?;
                match kind {
                    AssignmentType::Expression { start, end } => {
                        self.token_field("start", start)?;
                        self.token_field("end", end)?;
                    }
                    AssignmentType::TypeID {
                        decl_specifier_seq,
                        abstract_dcor,
                    } => {
                        self.list(
                            "decl_specifier_seq",
                            decl_specifier_seq,
                            Self::print_decl_specifier,
                        )?;
                        self.field("abstract_dcor")?;
                        self.print_production(abstract_dcor)?;
                    }
                }
            }
            Initializer::FunctionBody {
                colon,
                member_inits,
                open_curly,
                close_curly,
            } => {
                self.open("Initializer::FunctionBody")?;
                self.token_field("colon", colon)?;
                self.list("member_inits", member_inits, Self::print_member_init)?;
                self.token_field("open_curly", open_curly)?;
                self.token_field("close_curly", close_curly)?;
            }
            Initializer::BitField {
                colon,
                expression_start,
                expression_end,
            } => {
                self.open("Initializer::BitField")?;
                self.token_field("colon", colon)?;
                self.token_field("expression_start", expression_start)?;
                self.token_field("expression_end", expression_end)?;
            }
        }
        self.close();
        Ok(())
    }

    fn print_member_init(&mut self, init: &MemberInitializerWithComma) -> Result<()> {
        self.open("MemberInitializerWithComma")?;
        self.qid_field("qid", &init.qid)?;
        self.token_field("open_punc", &init.open_punc)?;
        self.token_field("close_punc", &init.close_punc)?;
        self.token_field("comma", &init.comma)?;
        self.close();
        Ok(())
    }

    fn print_expression(&mut self, expr: &Expression) -> Result<()> {
        match expr {
            Expression::Empty => {
                self.open("Expression::Empty")?;
            }
            Expression::Range { start, end } => {
                self.open("Expression::Range")?;
                self.token_field("start", start)?;
                self.token_field("end", end)?;
            }
            Expression::Call(call) => return self.print_expression_call(call),
        }
        self.close();
        Ok(())
    }

    fn print_expression_call(&mut self, call: &ExpressionCall) -> Result<()> {
        self.open("ExpressionCall")?;
        self.token_field("open_paren", &call.open_paren)?;
        self.list("arguments", &call.arguments, |p, arg| {
            p.open("ExpressionWithComma")?;
            p.field("expr")?;
            p.print_expression(&arg.expr)?;
            p.token_field("comma", &arg.comma)?;
            p.close();
            Ok(())
        })?;
        self.token_field("close_paren", &call.close_paren)?;
        self.close();
        Ok(())
    }

    // ==================== 出力の部品 ====================

    fn print_token(&mut self, token: &Token) -> Result<()> {
        if token.linear_loc >= 0
            && let Some(loc) = self
                .files
                .and_then(|files| files.expand_file_location(token.linear_loc))
        {
            write!(self.writer, "{}: ", loc)?;
        }
        writeln!(self.writer, "{:?}", token.text)
    }

    fn write_indent(&mut self) -> Result<()> {
        for _ in 0..self.indent {
            write!(self.writer, "  ")?;
        }
        Ok(())
    }

    /// ノード名を出力して字下げを1段深くする
    fn open(&mut self, name: &str) -> Result<()> {
        writeln!(self.writer, "{}", name)?;
        self.indent += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.indent -= 1;
    }

    fn field(&mut self, name: &str) -> Result<()> {
        self.write_indent()?;
        write!(self.writer, "{}: ", name)
    }

    fn token_field(&mut self, name: &str, token: &Token) -> Result<()> {
        self.field(name)?;
        self.print_token(token)
    }

    fn qid_field(&mut self, name: &str, qid: &QualifiedID) -> Result<()> {
        self.field(name)?;
        writeln!(self.writer, "\"{}\"", qid)
    }

    fn list<T>(
        &mut self,
        name: &str,
        items: &[T],
        mut print_item: impl FnMut(&mut Self, &T) -> Result<()>,
    ) -> Result<()> {
        self.field(name)?;
        writeln!(self.writer, "[]")?;
        self.indent += 1;
        for (i, item) in items.iter().enumerate() {
            self.write_indent()?;
            write!(self.writer, "[{}] ", i)?;
            print_item(self, item)?;
        }
        self.indent -= 1;
        Ok(())
    }
}

/// 構文木を字下げ形式で書き出す
pub fn dump_parse_tree<W: Write>(
    writer: W,
    tu: &TranslationUnit,
    files: Option<&VisitedFiles>,
) -> Result<()> {
    TreePrinter::new(writer, files).print_translation_unit(tu)
}

/// 構文木を字下げ形式の文字列にする
pub fn dump_to_string(tu: &TranslationUnit, files: Option<&VisitedFiles>) -> String {
    let mut buf = Vec::new();
    if dump_parse_tree(&mut buf, tu, files).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// 構文木を JSON にする
pub fn to_json(tu: &TranslationUnit) -> serde_json::Result<String> {
    serde_json::to_string_pretty(tu)
}

/// 宣言子チェーンを外側から順に英語で説明する（`int (*x)[3]` なら "pointer to array of"）
pub fn describe_declarator(chain: &Chain) -> String {
    let words: Vec<&str> = chain_iter(chain)
        .filter_map(|prod| match &prod.kind {
            ProductionKind::Parenthesized { .. } => None,
            ProductionKind::PointerTo { nested_name, punc } => Some(match punc.kind {
                TokenKind::SingleAmpersand => "reference to",
                TokenKind::DoubleAmpersand => "rvalue reference to",
                _ if !nested_name.is_empty() => "pointer to member of",
                _ => "pointer to",
            }),
            ProductionKind::ArrayOf { .. } => Some("array of"),
            ProductionKind::Function(_) => Some("function returning"),
            ProductionKind::Qualifier { keyword } => Some(keyword.text.as_str()),
        })
        .collect();
    words.join(" ")
}
