use crate::errors::GraphError;

use super::{
    ast::*,
    lexer::{Lexer, Token, TokenType},
};

const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "OPTIONAL", "WITH", "UNWIND", "MERGE", "SET", "DELETE", "DETACH", "REMOVE", "CALL", "FOREACH",
    "UNION", "ORDER", "SKIP", "LIMIT", "DISTINCT",
];

pub fn parse(input: &str) -> Result<Query, GraphError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = TokenParser::new(input, tokens);
    parser.parse_query()
}

struct TokenParser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    position: usize,
}

impl<'a> TokenParser<'a> {
    fn new(input: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            input,
            tokens,
            position: 0,
        }
    }

    fn parse_query(&mut self) -> Result<Query, GraphError> {
        let mut clauses = Vec::new();
        while !self.is_at_end() {
            if self.match_token(&TokenType::Semicolon) {
                if !self.is_at_end() {
                    return Err(self.error("only one statement is allowed per query"));
                }
                break;
            }
            clauses.push(self.parse_clause()?);
        }
        if clauses.is_empty() {
            return Err(GraphError::compile("empty query"));
        }
        Ok(Query { clauses })
    }

    fn parse_clause(&mut self) -> Result<Clause, GraphError> {
        if self.match_token(&TokenType::Match) {
            return Ok(Clause::Match(self.parse_match()?));
        }
        if self.match_token(&TokenType::Create) {
            return Ok(Clause::Create(self.parse_create()?));
        }
        if self.match_token(&TokenType::Return) {
            return Ok(Clause::Return(self.parse_return()?));
        }
        if let Some(keyword) = self.peek_unsupported_keyword() {
            return Err(GraphError::compile(format!("unsupported clause {keyword}")));
        }
        Err(self.error("expected MATCH, CREATE or RETURN"))
    }

    fn parse_match(&mut self) -> Result<MatchClause, GraphError> {
        let patterns = self.parse_pattern_list()?;
        let where_clause = if self.match_token(&TokenType::Where) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(MatchClause {
            patterns,
            where_clause,
        })
    }

    fn parse_create(&mut self) -> Result<CreateClause, GraphError> {
        let patterns = self.parse_pattern_list()?;
        Ok(CreateClause { patterns })
    }

    fn parse_return(&mut self) -> Result<ReturnClause, GraphError> {
        if let Some(keyword) = self.peek_unsupported_keyword() {
            return Err(GraphError::compile(format!(
                "unsupported RETURN modifier {keyword}"
            )));
        }
        let star = self.match_token(&TokenType::Asterisk);
        let mut items = Vec::new();
        if star && !self.match_token(&TokenType::Comma) {
            return Ok(ReturnClause { star, items });
        }
        loop {
            items.push(self.parse_return_item()?);
            if !self.match_token(&TokenType::Comma) {
                break;
            }
        }
        Ok(ReturnClause { star, items })
    }

    fn parse_return_item(&mut self) -> Result<ReturnItem, GraphError> {
        let start = self.peek().start;
        let expression = self.parse_expression()?;
        let end = self.previous().end;
        let text = self.input[start..end].trim().to_string();
        let alias = if self.match_token(&TokenType::As) {
            Some(self.parse_symbolic_name("RETURN alias")?)
        } else {
            None
        };
        Ok(ReturnItem {
            expression,
            alias,
            text,
        })
    }

    fn parse_pattern_list(&mut self) -> Result<Vec<Pattern>, GraphError> {
        let mut patterns = Vec::new();
        loop {
            patterns.push(self.parse_pattern()?);
            if !self.match_token(&TokenType::Comma) {
                break;
            }
        }
        Ok(patterns)
    }

    fn parse_pattern(&mut self) -> Result<Pattern, GraphError> {
        let start = self.parse_node_pattern()?;
        let mut steps = Vec::new();
        while self.check_relationship_start() {
            let relationship = self.parse_relationship_pattern()?;
            let node = self.parse_node_pattern()?;
            steps.push(PatternStep { relationship, node });
        }
        Ok(Pattern { start, steps })
    }

    fn check_relationship_start(&self) -> bool {
        matches!(
            self.peek().token_type,
            TokenType::LeftArrow | TokenType::Dash
        )
    }

    fn parse_node_pattern(&mut self) -> Result<NodePattern, GraphError> {
        self.consume(&TokenType::LeftParen, "expected '(' to start a node pattern")?;
        let variable = if self.peek_is_identifier() {
            Some(self.parse_symbolic_name("node variable")?)
        } else {
            None
        };
        let mut labels = Vec::new();
        while self.match_token(&TokenType::Colon) {
            labels.push(self.parse_symbolic_name("label")?);
        }
        let properties = if self.check(&TokenType::LeftBrace) {
            self.parse_map_entries()?
        } else {
            Vec::new()
        };
        self.consume(&TokenType::RightParen, "expected ')' to close a node pattern")?;
        Ok(NodePattern {
            variable,
            labels,
            properties,
        })
    }

    fn parse_relationship_pattern(&mut self) -> Result<RelationshipPattern, GraphError> {
        let incoming = if self.match_token(&TokenType::LeftArrow) {
            true
        } else {
            self.consume(&TokenType::Dash, "expected relationship pattern")?;
            false
        };

        let mut variable = None;
        let mut types = Vec::new();
        let mut properties = Vec::new();
        if self.match_token(&TokenType::LeftBracket) {
            if self.peek_is_identifier() {
                variable = Some(self.parse_symbolic_name("relationship variable")?);
            }
            if self.match_token(&TokenType::Colon) {
                types.push(self.parse_symbolic_name("relationship type")?);
                while self.match_token(&TokenType::Pipe) {
                    self.match_token(&TokenType::Colon);
                    types.push(self.parse_symbolic_name("relationship type")?);
                }
            }
            if self.check(&TokenType::Asterisk) {
                return Err(GraphError::compile(
                    "variable-length relationships are not supported",
                ));
            }
            if self.check(&TokenType::LeftBrace) {
                properties = self.parse_map_entries()?;
            }
            self.consume(&TokenType::RightBracket, "expected ']' after relationship detail")?;
        }

        let outgoing = if self.match_token(&TokenType::RightArrow) {
            true
        } else {
            self.consume(&TokenType::Dash, "expected '-' or '->' after relationship")?;
            false
        };

        let direction = match (incoming, outgoing) {
            (false, true) => Direction::Outgoing,
            (true, false) => Direction::Incoming,
            (false, false) => Direction::Undirected,
            (true, true) => {
                return Err(GraphError::compile("invalid relationship direction <-->"));
            }
        };
        Ok(RelationshipPattern {
            variable,
            types,
            direction,
            properties,
        })
    }

    fn parse_map_entries(&mut self) -> Result<Vec<(String, Expression)>, GraphError> {
        self.consume(&TokenType::LeftBrace, "expected '{'")?;
        let mut entries = Vec::new();
        while !self.check(&TokenType::RightBrace) {
            let key = self.parse_symbolic_name("property key")?;
            self.consume(&TokenType::Colon, "expected ':' in property map")?;
            let value = self.parse_expression()?;
            entries.push((key, value));
            if !self.match_token(&TokenType::Comma) {
                break;
            }
        }
        self.consume(&TokenType::RightBrace, "expected '}' to close property map")?;
        Ok(entries)
    }

    fn parse_expression(&mut self) -> Result<Expression, GraphError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expression, GraphError> {
        let mut left = self.parse_and()?;
        while self.match_token(&TokenType::Or) {
            let right = self.parse_and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, GraphError> {
        let mut left = self.parse_not()?;
        while self.match_token(&TokenType::And) {
            let right = self.parse_not()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expression, GraphError> {
        if self.match_token(&TokenType::Not) {
            let inner = self.parse_not()?;
            return Ok(Expression::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expression, GraphError> {
        let left = self.parse_unary()?;
        // `x<-1` lexes as an arrow; outside a pattern it is `x < -1`.
        if self.match_token(&TokenType::LeftArrow) {
            let right = negate(self.parse_unary()?);
            return Ok(Expression::Comparison(
                Box::new(left),
                ComparisonOp::Lt,
                Box::new(right),
            ));
        }
        let op = match self.peek().token_type {
            TokenType::Equals => ComparisonOp::Eq,
            TokenType::NotEquals => ComparisonOp::Ne,
            TokenType::LessThan => ComparisonOp::Lt,
            TokenType::LessEqual => ComparisonOp::Le,
            TokenType::GreaterThan => ComparisonOp::Gt,
            TokenType::GreaterEqual => ComparisonOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_unary()?;
        Ok(Expression::Comparison(Box::new(left), op, Box::new(right)))
    }

    fn parse_unary(&mut self) -> Result<Expression, GraphError> {
        if self.match_token(&TokenType::Dash) {
            let inner = self.parse_unary()?;
            return Ok(negate(inner));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expression, GraphError> {
        let mut expression = self.parse_primary()?;
        loop {
            if self.match_token(&TokenType::Dot) {
                let key = self.parse_symbolic_name("property name")?;
                expression = Expression::Property(Box::new(expression), key);
            } else if self.check(&TokenType::Colon) && matches!(expression, Expression::Variable(_))
            {
                let mut labels = Vec::new();
                while self.match_token(&TokenType::Colon) {
                    labels.push(self.parse_symbolic_name("label")?);
                }
                expression = Expression::HasLabels(Box::new(expression), labels);
            } else {
                return Ok(expression);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expression, GraphError> {
        let token = self.advance().clone();
        match token.token_type {
            TokenType::Integer(v) => Ok(Expression::Literal(Literal::Integer(v))),
            TokenType::Float(v) => Ok(Expression::Literal(Literal::Float(v))),
            TokenType::String(s) => Ok(Expression::Literal(Literal::String(s))),
            TokenType::Boolean(b) => Ok(Expression::Literal(Literal::Boolean(b))),
            TokenType::Null => Ok(Expression::Literal(Literal::Null)),
            TokenType::LeftParen => {
                let inner = self.parse_expression()?;
                self.consume(&TokenType::RightParen, "expected ')'")?;
                Ok(inner)
            }
            TokenType::LeftBracket => {
                let mut items = Vec::new();
                while !self.check(&TokenType::RightBracket) {
                    items.push(self.parse_expression()?);
                    if !self.match_token(&TokenType::Comma) {
                        break;
                    }
                }
                self.consume(&TokenType::RightBracket, "expected ']' to close list")?;
                Ok(Expression::List(items))
            }
            TokenType::LeftBrace => {
                self.position -= 1;
                Ok(Expression::Map(self.parse_map_entries()?))
            }
            TokenType::Identifier(name) => {
                if self.match_token(&TokenType::LeftParen) {
                    self.parse_function_call(name)
                } else {
                    Ok(Expression::Variable(name))
                }
            }
            _ => Err(GraphError::compile(format!(
                "unexpected '{}' at offset {} while parsing expression",
                self.token_text(&token),
                token.start
            ))),
        }
    }

    fn parse_function_call(&mut self, name: String) -> Result<Expression, GraphError> {
        let name = name.to_ascii_lowercase();
        if name == "count" && self.match_token(&TokenType::Asterisk) {
            self.consume(&TokenType::RightParen, "expected ')' after count(*")?;
            return Ok(Expression::CountStar);
        }
        let mut arguments = Vec::new();
        while !self.check(&TokenType::RightParen) {
            arguments.push(self.parse_expression()?);
            if !self.match_token(&TokenType::Comma) {
                break;
            }
        }
        self.consume(&TokenType::RightParen, "expected ')' to close function call")?;
        Ok(Expression::FunctionCall { name, arguments })
    }

    /// Identifiers, plus keywords where a name is expected (`n.match`, `{return: 1}`).
    fn parse_symbolic_name(&mut self, context: &str) -> Result<String, GraphError> {
        let token = self.advance().clone();
        match &token.token_type {
            TokenType::Identifier(name) => Ok(name.clone()),
            other if other.is_keyword() => Ok(self.token_text(&token).to_string()),
            _ => Err(GraphError::compile(format!(
                "expected {context} at offset {}",
                token.start
            ))),
        }
    }

    fn peek_unsupported_keyword(&self) -> Option<String> {
        match &self.peek().token_type {
            TokenType::Identifier(name) => {
                let upper = name.to_ascii_uppercase();
                UNSUPPORTED_KEYWORDS
                    .contains(&upper.as_str())
                    .then_some(upper)
            }
            _ => None,
        }
    }

    fn token_text(&self, token: &Token) -> &str {
        &self.input[token.start..token.end]
    }

    fn error(&self, message: &str) -> GraphError {
        let token = self.peek();
        let found = match token.token_type {
            TokenType::Eof => "end of input".to_string(),
            _ => format!("'{}'", self.token_text(token)),
        };
        GraphError::compile(format!(
            "{message}, found {found} at offset {}",
            token.start
        ))
    }

    fn peek_is_identifier(&self) -> bool {
        matches!(self.peek().token_type, TokenType::Identifier(_))
    }

    fn match_token(&mut self, token_type: &TokenType) -> bool {
        if self.check(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, token_type: &TokenType) -> bool {
        std::mem::discriminant(token_type) == std::mem::discriminant(&self.peek().token_type)
    }

    fn consume(&mut self, token_type: &TokenType, message: &str) -> Result<(), GraphError> {
        if self.check(token_type) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().token_type, TokenType::Eof)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.position]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.position.saturating_sub(1)]
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.position += 1;
            &self.tokens[self.position - 1]
        } else {
            &self.tokens[self.position]
        }
    }
}

fn negate(inner: Expression) -> Expression {
    match inner {
        Expression::Literal(Literal::Integer(v)) => Expression::Literal(Literal::Integer(-v)),
        Expression::Literal(Literal::Float(v)) => Expression::Literal(Literal::Float(-v)),
        other => Expression::Negate(Box::new(other)),
    }
}
