use crate::ast::{AttributeSelector, Combinator, CompoundSelector, SelectorPart};
use crate::error::SelectorSyntaxError;

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

pub(crate) fn parse(expr: &str) -> Result<Vec<SelectorPart>, SelectorSyntaxError> {
    let mut parser = Parser { src: expr, pos: 0 };
    parser.skip_whitespace();
    if parser.at_end() {
        return Err(SelectorSyntaxError::new(0, "", "empty selector"));
    }

    let mut parts = vec![SelectorPart {
        combinator: None,
        compound: parser.compound()?,
    }];

    loop {
        let had_space = parser.skip_whitespace();
        let combinator = match parser.peek() {
            None => break,
            Some('>') => {
                parser.bump();
                parser.skip_whitespace();
                if parser.at_end() {
                    return Err(parser.error("expected selector after `>`"));
                }
                Combinator::Child
            }
            Some(_) if had_space => Combinator::Descendant,
            Some(_) => return Err(parser.error("unexpected character")),
        };
        parts.push(SelectorPart {
            combinator: Some(combinator),
            compound: parser.compound()?,
        });
    }

    Ok(parts)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
        self.pos > start
    }

    fn error(&self, message: &str) -> SelectorSyntaxError {
        self.error_at(self.pos, message)
    }

    fn error_at(&self, position: usize, message: &str) -> SelectorSyntaxError {
        let token = self.src[position..]
            .chars()
            .next()
            .map_or_else(|| "end of input".to_string(), String::from);
        SelectorSyntaxError::new(position, token, message)
    }

    fn expect(&mut self, expected: char) -> Result<(), SelectorSyntaxError> {
        if self.peek() == Some(expected) {
            self.bump();
            Ok(())
        } else {
            Err(self.error(&format!("expected `{expected}`")))
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, SelectorSyntaxError> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.bump();
        }
        if self.pos == start {
            return Err(self.error(&format!("expected {what}")));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn compound(&mut self) -> Result<CompoundSelector, SelectorSyntaxError> {
        let start = self.pos;
        let mut compound = CompoundSelector::default();

        match self.peek() {
            Some('*') => {
                self.bump();
                compound.universal = true;
            }
            Some(c) if is_ident_char(c) => {
                compound.tag = Some(self.ident("tag name")?.to_ascii_lowercase());
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    let at = self.pos;
                    self.bump();
                    let id = self.ident("id after `#`")?;
                    if compound.id.replace(id).is_some() {
                        return Err(self.error_at(at, "more than one id"));
                    }
                }
                Some('.') => {
                    self.bump();
                    compound.classes.push(self.ident("class name after `.`")?);
                }
                Some('[') => {
                    self.bump();
                    compound.attributes.push(self.attribute()?);
                }
                Some(':') => {
                    let at = self.pos;
                    self.bump();
                    let n = self.nth_child(at)?;
                    if compound.nth_child.replace(n).is_some() {
                        return Err(self.error_at(at, "more than one :nth-child"));
                    }
                }
                _ => break,
            }
        }

        if self.pos == start {
            return Err(self.error("expected selector"));
        }
        Ok(compound)
    }

    fn attribute(&mut self) -> Result<AttributeSelector, SelectorSyntaxError> {
        self.skip_whitespace();
        let name = self.ident("attribute name")?;
        self.skip_whitespace();

        match self.peek() {
            Some(']') => {
                self.bump();
                Ok(AttributeSelector::present(name))
            }
            Some('=') => {
                self.bump();
                self.skip_whitespace();
                let value = match self.peek() {
                    Some(quote @ ('"' | '\'')) => self.quoted(quote)?,
                    _ => self.ident("attribute value")?,
                };
                self.skip_whitespace();
                self.expect(']')?;
                Ok(AttributeSelector::equals(name, value))
            }
            _ => Err(self.error("expected `]` or `=`")),
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String, SelectorSyntaxError> {
        let open = self.pos;
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error_at(open, "unterminated string")),
                Some('\\') => match self.bump() {
                    Some(c) => value.push(c),
                    None => return Err(self.error_at(open, "unterminated string")),
                },
                Some(c) if c == quote => return Ok(value),
                Some(c) => value.push(c),
            }
        }
    }

    fn nth_child(&mut self, colon: usize) -> Result<usize, SelectorSyntaxError> {
        let name = self.ident("pseudo-class")?;
        if name != "nth-child" {
            return Err(self.error_at(colon, "only :nth-child(n) is supported"));
        }
        self.expect('(')?;
        self.skip_whitespace();
        let digits_at = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        let n = self.src[digits_at..self.pos]
            .parse::<usize>()
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| self.error_at(digits_at, "expected a positive integer"))?;
        self.skip_whitespace();
        self.expect(')')?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Combinator, CompoundSelector, Selector, SelectorSyntaxError};
    use pretty_assertions::assert_eq;

    fn err(expr: &str) -> SelectorSyntaxError {
        expr.parse::<Selector>().unwrap_err()
    }

    #[test]
    fn parses_compound_parts() {
        let selector: Selector = r#"BUTTON#submit.btn.primary[type="submit"][disabled]"#.parse().unwrap();
        assert_eq!(
            selector,
            Selector::new(
                CompoundSelector::tag("button")
                    .with_id("submit")
                    .with_class("btn")
                    .with_class("primary")
                    .with_attr("type", "submit")
                    .with_attr_present("disabled")
            )
        );
    }

    #[test]
    fn parses_combinators() {
        let selector: Selector = "  form.login   >  div  input[name=email] ".parse().unwrap();
        let combinators: Vec<_> = selector.parts().iter().map(|p| p.combinator).collect();
        assert_eq!(
            combinators,
            vec![None, Some(Combinator::Child), Some(Combinator::Descendant)]
        );
        assert_eq!(selector.to_string(), r#"form.login > div input[name="email"]"#);
    }

    #[test]
    fn child_combinator_without_spaces() {
        let selector: Selector = "ul>li:nth-child(3)".parse().unwrap();
        assert_eq!(selector.to_string(), "ul > li:nth-child(3)");
    }

    #[test]
    fn quoted_values_keep_spaces_and_case() {
        let selector: Selector = "[aria-label='Sign In Now']".parse().unwrap();
        assert_eq!(selector.subject().attribute_value("aria-label"), Some("Sign In Now"));
    }

    #[test]
    fn universal_and_bare_attribute() {
        assert!("*".parse::<Selector>().unwrap().subject().universal);
        let selector: Selector = r#"[data-testid="submit-btn"]"#.parse().unwrap();
        assert_eq!(selector.subject().tag, None);
        assert_eq!(selector.to_string(), r#"[data-testid="submit-btn"]"#);
    }

    #[test]
    fn bracket_soup_is_rejected() {
        let e = err("[[[");
        assert_eq!(e.position, 1);
        assert_eq!(e.token, "[");
    }

    #[test]
    fn empty_and_blank_are_rejected() {
        assert_eq!(err("").message, "empty selector");
        assert_eq!(err("   ").message, "empty selector");
    }

    #[test]
    fn dangling_combinator() {
        assert_eq!(err("div >").token, "end of input");
        assert_eq!(err("> div").position, 0);
    }

    #[test]
    fn unsupported_syntax_is_rejected() {
        for expr in [
            "div, span",
            "a:hover",
            "li:nth-child(0)",
            "li:nth-child(odd)",
            "a[href^=\"/x\"]",
            "#",
            ".",
            "div#a#b",
            "[name=\"open",
            "div + p",
            "//div[@id='x']",
        ] {
            assert!(expr.parse::<Selector>().is_err(), "{expr} should be rejected");
        }
    }

    #[test]
    fn error_reports_offending_token() {
        let e = err("div > span,a");
        assert_eq!(e.position, 10);
        assert_eq!(e.token, ",");
        assert!(e.to_string().contains("at 10"));
    }
}
