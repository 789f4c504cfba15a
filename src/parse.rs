//! Parser for build manifests.
//!
//! To avoid allocations, parsing frequently uses references into the input
//! text, marked with the lifetime `'text`.  The parser produces syntax-level
//! statements; resolving them into the graph is the loader's job.

use crate::{
    eval::{Chunk, Template},
    scanner::{ParseError, ParseResult, Scanner},
    smallmap::SmallMap,
};
use std::path::Path;

/// A list of variable bindings, as expressed with syntax like:
///   key = $val
pub type VarList<'text> = SmallMap<&'text str, Template<&'text str>>;

pub struct Rule<'text> {
    pub name: &'text str,
    pub vars: VarList<'text>,
}

pub struct Build<'text> {
    pub rule: &'text str,
    pub line: usize,
    pub outs: Vec<Template<&'text str>>,
    pub explicit_outs: usize,
    pub ins: Vec<Template<&'text str>>,
    pub explicit_ins: usize,
    pub implicit_ins: usize,
    pub order_only_ins: usize,
    pub vars: VarList<'text>,
}

pub enum Statement<'text> {
    Rule(Rule<'text>),
    Build(Build<'text>),
    Default(Vec<Template<&'text str>>),
    Include(Template<&'text str>),
    Subninja(Template<&'text str>),
    Binding(&'text str, Template<&'text str>),
}

pub struct Parser<'text> {
    scanner: Scanner<'text>,
    /// Reading templates is very hot when parsing, so we always read into
    /// this buffer and then clone it afterwards.
    chunk_buf: Vec<Chunk<&'text str>>,
}

impl<'text> Parser<'text> {
    pub fn new(buf: &'text [u8]) -> Parser<'text> {
        Parser {
            scanner: Scanner::new(buf),
            chunk_buf: Vec::with_capacity(16),
        }
    }

    pub fn format_parse_error(&self, filename: &Path, err: ParseError) -> String {
        self.scanner.format_parse_error(filename, err)
    }

    pub fn read(&mut self) -> ParseResult<Option<Statement<'text>>> {
        loop {
            match self.scanner.peek() {
                '\0' => return Ok(None),
                '\n' | '\r' => self.scanner.next(),
                '#' => self.skip_comment()?,
                ' ' | '\t' => return self.scanner.parse_error("unexpected whitespace"),
                _ => {
                    let ident = self.read_ident()?;
                    self.skip_spaces();
                    match ident {
                        "rule" => return Ok(Some(Statement::Rule(self.read_rule()?))),
                        "build" => return Ok(Some(Statement::Build(self.read_build()?))),
                        "default" => return Ok(Some(Statement::Default(self.read_default()?))),
                        "include" => {
                            return Ok(Some(Statement::Include(self.read_eval(false)?)));
                        }
                        "subninja" => {
                            return Ok(Some(Statement::Subninja(self.read_eval(false)?)));
                        }
                        ident => {
                            let val = self.read_vardef()?;
                            return Ok(Some(Statement::Binding(ident, val)));
                        }
                    }
                }
            }
        }
    }

    /// Read the `= ...` part of a variable definition.
    fn read_vardef(&mut self) -> ParseResult<Template<&'text str>> {
        self.skip_spaces();
        self.scanner.expect('=')?;
        self.skip_spaces();
        // read_eval will error out if there's nothing to read
        if self.scanner.peek_newline() {
            self.scanner.skip('\r');
            self.scanner.expect('\n')?;
            return Ok(Template::new(Vec::new()));
        }
        let result = self.read_eval(false);
        self.scanner.skip('\r');
        self.scanner.expect('\n')?;
        result
    }

    /// Read a collection of `  foo = bar` variables, with leading indent.
    fn read_scoped_vars(
        &mut self,
        variable_name_validator: fn(var: &str) -> bool,
    ) -> ParseResult<VarList<'text>> {
        let mut vars = VarList::default();
        while self.scanner.peek() == ' ' {
            self.scanner.skip_spaces();
            let name = self.read_ident()?;
            if !variable_name_validator(name) {
                return self
                    .scanner
                    .parse_error(format!("unexpected variable {:?}", name));
            }
            self.skip_spaces();
            let val = self.read_vardef()?;
            vars.insert(name, val);
        }
        Ok(vars)
    }

    fn read_rule(&mut self) -> ParseResult<Rule<'text>> {
        let name = self.read_ident()?;
        self.scanner.skip('\r');
        self.scanner.expect('\n')?;
        let vars = self.read_scoped_vars(|var| {
            matches!(
                var,
                "command" | "description" | "depfile" | "generator" | "restat"
            )
        })?;
        Ok(Rule { name, vars })
    }

    fn read_paths_to(&mut self, v: &mut Vec<Template<&'text str>>) -> ParseResult<()> {
        self.skip_spaces();
        while self.scanner.peek() != ':'
            && self.scanner.peek() != '|'
            && !self.scanner.peek_newline()
        {
            v.push(self.read_eval(true)?);
            self.skip_spaces();
        }
        Ok(())
    }

    fn read_build(&mut self) -> ParseResult<Build<'text>> {
        let line = self.scanner.line;
        let mut outs = Vec::new();
        self.read_paths_to(&mut outs)?;
        let explicit_outs = outs.len();

        if self.scanner.peek() == '|' {
            self.scanner.next();
            self.read_paths_to(&mut outs)?;
        }

        self.scanner.expect(':')?;
        self.skip_spaces();
        let rule = self.read_ident()?;

        let mut ins = Vec::new();
        self.read_paths_to(&mut ins)?;
        let explicit_ins = ins.len();

        // `|` starts implicit inputs, unless it is the start of a `||`.
        if self.scanner.peek() == '|' {
            self.scanner.next();
            if self.scanner.peek() == '|' {
                self.scanner.back();
            } else {
                self.read_paths_to(&mut ins)?;
            }
        }
        let implicit_ins = ins.len() - explicit_ins;

        if self.scanner.peek() == '|' {
            self.scanner.next();
            self.scanner.expect('|')?;
            self.read_paths_to(&mut ins)?;
        }
        let order_only_ins = ins.len() - implicit_ins - explicit_ins;

        self.scanner.skip('\r');
        self.scanner.expect('\n')?;
        let vars = self.read_scoped_vars(|_| true)?;
        Ok(Build {
            rule,
            line,
            outs,
            explicit_outs,
            ins,
            explicit_ins,
            implicit_ins,
            order_only_ins,
            vars,
        })
    }

    fn read_default(&mut self) -> ParseResult<Vec<Template<&'text str>>> {
        let mut defaults = Vec::new();
        self.read_paths_to(&mut defaults)?;
        if defaults.is_empty() {
            return self.scanner.parse_error("expected path");
        }
        self.scanner.skip('\r');
        self.scanner.expect('\n')?;
        Ok(defaults)
    }

    fn skip_comment(&mut self) -> ParseResult<()> {
        loop {
            match self.scanner.read() {
                '\0' => {
                    self.scanner.back();
                    return Ok(());
                }
                '\n' => return Ok(()),
                _ => {}
            }
        }
    }

    /// Read an identifier -- rule name, variable name, etc.
    fn read_ident(&mut self) -> ParseResult<&'text str> {
        let start = self.scanner.ofs;
        while matches!(
            self.scanner.read(),
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' | '.'
        ) {}
        self.scanner.back();
        let end = self.scanner.ofs;
        if end == start {
            return self.scanner.parse_error("failed to scan ident");
        }
        Ok(self.scanner.slice(start, end))
    }

    /// Reads a Template.  Stops at either a newline, or ' ', ':', '|' if
    /// stop_at_path_separators is set, without consuming the character that
    /// caused it to stop.
    fn read_eval(&mut self, stop_at_path_separators: bool) -> ParseResult<Template<&'text str>> {
        self.chunk_buf.clear();
        let mut ofs = self.scanner.ofs;
        let end = loop {
            match self.scanner.read() {
                '\0' => return self.scanner.parse_error("unexpected EOF"),
                ' ' | ':' | '|' if stop_at_path_separators => {
                    self.scanner.back();
                    break self.scanner.ofs;
                }
                '\n' => {
                    self.scanner.back();
                    break self.scanner.ofs;
                }
                '\r' if self.scanner.peek() == '\n' => {
                    self.scanner.back();
                    break self.scanner.ofs;
                }
                '$' => {
                    let end = self.scanner.ofs - 1;
                    if end > ofs {
                        self.chunk_buf.push(Chunk::Text(self.scanner.slice(ofs, end)));
                    }
                    let escape = self.read_escape()?;
                    self.chunk_buf.push(escape);
                    ofs = self.scanner.ofs;
                }
                _ => {}
            }
        };
        if end > ofs {
            self.chunk_buf.push(Chunk::Text(self.scanner.slice(ofs, end)));
        }
        if self.chunk_buf.is_empty() {
            return self.scanner.parse_error("expected a string");
        }
        Ok(Template::new(self.chunk_buf.clone()))
    }

    /// Read a variable name as found after a '$' in an eval.  This is the
    /// same as read_ident but without period, so that e.g.
    ///   foo = $bar.d
    /// parses as a reference to $bar.
    fn read_simple_varname(&mut self) -> ParseResult<&'text str> {
        let start = self.scanner.ofs;
        while matches!(self.scanner.read(), 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-') {}
        self.scanner.back();
        let end = self.scanner.ofs;
        if end == start {
            return self.scanner.parse_error("failed to scan variable name");
        }
        Ok(self.scanner.slice(start, end))
    }

    /// Read and interpret the text following a '$' escape character.
    fn read_escape(&mut self) -> ParseResult<Chunk<&'text str>> {
        Ok(match self.scanner.read() {
            '\n' | '\r' => {
                self.scanner.skip_spaces();
                Chunk::Text(self.scanner.slice(0, 0))
            }
            ' ' | '$' | ':' => {
                Chunk::Text(self.scanner.slice(self.scanner.ofs - 1, self.scanner.ofs))
            }
            '{' => {
                let start = self.scanner.ofs;
                loop {
                    match self.scanner.read() {
                        '\0' => return self.scanner.parse_error("unexpected EOF"),
                        '}' => break,
                        _ => {}
                    }
                }
                let end = self.scanner.ofs - 1;
                Chunk::Var(self.scanner.slice(start, end))
            }
            _ => {
                // '$' followed by some other text.
                self.scanner.back();
                let var = self.read_simple_varname()?;
                Chunk::Var(var)
            }
        })
    }

    fn skip_spaces(&mut self) {
        loop {
            match self.scanner.read() {
                ' ' => {}
                '$' => {
                    if self.scanner.peek() != '\n' {
                        self.scanner.back();
                        return;
                    }
                    self.scanner.next();
                }
                _ => {
                    self.scanner.back();
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Chunk;

    fn test_case_buffer(test_case: &str) -> Vec<u8> {
        let mut buf = test_case.as_bytes().to_vec();
        buf.push(0);
        buf
    }

    fn test_for_line_endings(input: &[&str], test: fn(&str)) {
        let test_case_lf = input.join("\n");
        let test_case_crlf = input.join("\r\n");
        for test_case in [test_case_lf, test_case_crlf] {
            test(&test_case);
        }
    }

    #[test]
    fn parse_defaults() {
        test_for_line_endings(&["var = 3", "default a b$var c", ""], |test_case| {
            let buf = test_case_buffer(test_case);
            let mut parser = Parser::new(&buf);
            match parser.read().unwrap().unwrap() {
                Statement::Binding("var", _) => {}
                _ => panic!("expected binding"),
            };
            let default = match parser.read().unwrap().unwrap() {
                Statement::Default(d) => d,
                _ => panic!("expected default"),
            };
            assert_eq!(
                default,
                vec![
                    Template::new(vec![Chunk::Text("a")]),
                    Template::new(vec![Chunk::Text("b"), Chunk::Var("var")]),
                    Template::new(vec![Chunk::Text("c")]),
                ]
            );
        });
    }

    #[test]
    fn parse_dot_in_eval() {
        let buf = test_case_buffer("x = $y.z\n");
        let mut parser = Parser::new(&buf);
        match parser.read().unwrap().unwrap() {
            Statement::Binding("x", template) => {
                assert_eq!(
                    template,
                    Template::new(vec![Chunk::Var("y"), Chunk::Text(".z")])
                );
            }
            _ => panic!("expected binding"),
        }
    }

    #[test]
    fn parse_dot_in_rule() {
        let buf = test_case_buffer("rule x.y\n  command = x\n");
        let mut parser = Parser::new(&buf);
        let stmt = parser.read().unwrap().unwrap();
        assert!(matches!(
            stmt,
            Statement::Rule(Rule {
                name: "x.y",
                vars: _
            })
        ));
    }

    #[test]
    fn parse_trailing_newline() {
        let buf = test_case_buffer("build$\n foo$\n : $\n  touch $\n\n");
        let mut parser = Parser::new(&buf);
        let stmt = parser.read().unwrap().unwrap();
        assert!(matches!(
            stmt,
            Statement::Build(Build { rule: "touch", .. })
        ));
    }

    #[test]
    fn parse_input_groups() {
        let buf = test_case_buffer("build o1 | o2: cc a b | c d || e\n");
        let mut parser = Parser::new(&buf);
        let build = match parser.read().unwrap().unwrap() {
            Statement::Build(b) => b,
            _ => panic!("expected build"),
        };
        assert_eq!(build.outs.len(), 2);
        assert_eq!(build.explicit_outs, 1);
        assert_eq!(build.ins.len(), 5);
        assert_eq!(build.explicit_ins, 2);
        assert_eq!(build.implicit_ins, 2);
        assert_eq!(build.order_only_ins, 1);
    }

    #[test]
    fn parse_order_only_without_implicit() {
        let buf = test_case_buffer("build out: cc a || e\n");
        let mut parser = Parser::new(&buf);
        let build = match parser.read().unwrap().unwrap() {
            Statement::Build(b) => b,
            _ => panic!("expected build"),
        };
        assert_eq!(build.explicit_ins, 1);
        assert_eq!(build.implicit_ins, 0);
        assert_eq!(build.order_only_ins, 1);
    }
}
