// ==========================================
// 批次对账与周报系统 - 问题判定规则
// ==========================================
// 职责: 解析并执行"哪些生产算问题"的可配置谓词
// 语法: expr := and (OR and)* ; and := unary (AND unary)* ;
//       unary := NOT unary | '(' expr ')' | field op value
// 红线: 解析失败是致命配置错误，必须在处理开始前暴露
// ==========================================

use crate::domain::records::ProductionRecord;
use crate::domain::types::InspectionResult;
use crate::engine::error::{ReconcileError, ReconcileResult};
use std::fmt;

/// 默认规则（与历史口径一致: line_issue 为真即算问题）
pub const DEFAULT_ISSUE_RULE: &str = "line_issue_flag = true";

// ==========================================
// 字段 / 运算符 / 字面量
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueField {
    LineIssueFlag,
    InspectionResult,
    DowntimeMinutes,
    PlannedUnits,
    ActualUnits,
    UnitShortfall,
    Line,
    IssueCategory,
    PartNumber,
}

impl IssueField {
    fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "line_issue_flag" | "line_issue" => Some(IssueField::LineIssueFlag),
            "inspection_result" => Some(IssueField::InspectionResult),
            "downtime_minutes" | "downtime" => Some(IssueField::DowntimeMinutes),
            "planned_units" => Some(IssueField::PlannedUnits),
            "actual_units" => Some(IssueField::ActualUnits),
            "unit_shortfall" => Some(IssueField::UnitShortfall),
            "line" | "production_line" => Some(IssueField::Line),
            "issue_category" | "primary_issue" => Some(IssueField::IssueCategory),
            "part_number" => Some(IssueField::PartNumber),
            _ => None,
        }
    }

    fn kind(&self) -> FieldKind {
        match self {
            IssueField::LineIssueFlag => FieldKind::Bool,
            IssueField::InspectionResult => FieldKind::Result,
            IssueField::DowntimeMinutes
            | IssueField::PlannedUnits
            | IssueField::ActualUnits
            | IssueField::UnitShortfall => FieldKind::Number,
            IssueField::Line | IssueField::IssueCategory | IssueField::PartNumber => {
                FieldKind::Text
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Bool,
    Result,
    Number,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn is_equality(&self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }

    fn apply_f64(&self, left: f64, right: f64) -> bool {
        match self {
            CompareOp::Eq => (left - right).abs() < f64::EPSILON,
            CompareOp::Ne => (left - right).abs() >= f64::EPSILON,
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Result(Option<InspectionResult>), // None = 尚无质检
    Number(f64),
    Text(String), // 已小写
}

// ==========================================
// IssueExpr - 表达式树
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum IssueExpr {
    Or(Box<IssueExpr>, Box<IssueExpr>),
    And(Box<IssueExpr>, Box<IssueExpr>),
    Not(Box<IssueExpr>),
    Compare {
        field: IssueField,
        op: CompareOp,
        value: Literal,
    },
}

/// 判定上下文: 一次生产 + 所属批次的最新质检结果
#[derive(Debug, Clone, Copy)]
pub struct IssueContext<'a> {
    pub run: &'a ProductionRecord,
    pub inspection_result: Option<InspectionResult>,
}

impl IssueExpr {
    fn evaluate(&self, ctx: &IssueContext<'_>) -> bool {
        match self {
            IssueExpr::Or(l, r) => l.evaluate(ctx) || r.evaluate(ctx),
            IssueExpr::And(l, r) => l.evaluate(ctx) && r.evaluate(ctx),
            IssueExpr::Not(inner) => !inner.evaluate(ctx),
            IssueExpr::Compare { field, op, value } => compare(*field, *op, value, ctx),
        }
    }
}

// 缺失值不满足任何比较
fn compare(field: IssueField, op: CompareOp, value: &Literal, ctx: &IssueContext<'_>) -> bool {
    let run = ctx.run;
    match (field, value) {
        (IssueField::LineIssueFlag, Literal::Bool(expected)) => match op {
            CompareOp::Eq => run.line_issue_flag == *expected,
            _ => run.line_issue_flag != *expected,
        },
        (IssueField::InspectionResult, Literal::Result(expected)) => match op {
            CompareOp::Eq => ctx.inspection_result == *expected,
            _ => ctx.inspection_result != *expected,
        },
        (IssueField::DowntimeMinutes, Literal::Number(n)) => op.apply_f64(run.downtime_minutes, *n),
        (IssueField::PlannedUnits, Literal::Number(n)) => run
            .planned_units
            .map(|v| op.apply_f64(v as f64, *n))
            .unwrap_or(false),
        (IssueField::ActualUnits, Literal::Number(n)) => run
            .actual_units
            .map(|v| op.apply_f64(v as f64, *n))
            .unwrap_or(false),
        (IssueField::UnitShortfall, Literal::Number(n)) => {
            if run.planned_units.is_none() && run.actual_units.is_none() {
                false
            } else {
                op.apply_f64(run.unit_shortfall() as f64, *n)
            }
        }
        (IssueField::Line, Literal::Text(t)) => compare_text(Some(&run.line), op, t),
        (IssueField::IssueCategory, Literal::Text(t)) => {
            compare_text(run.issue_category.as_ref(), op, t)
        }
        (IssueField::PartNumber, Literal::Text(t)) => compare_text(run.part_number.as_ref(), op, t),
        // 解析阶段已做类型检查
        _ => false,
    }
}

fn compare_text(actual: Option<&String>, op: CompareOp, expected: &str) -> bool {
    match actual {
        None => false,
        Some(v) => {
            let equal = v.trim().to_lowercase() == expected;
            match op {
                CompareOp::Eq => equal,
                _ => !equal,
            }
        }
    }
}

// ==========================================
// IssueRule - 已解析的规则
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct IssueRule {
    text: String,
    expr: IssueExpr,
}

impl IssueRule {
    /// 解析规则文本
    pub fn parse(text: &str) -> ReconcileResult<Self> {
        let tokens = tokenize(text).map_err(|message| invalid(text, message))?;
        if tokens.is_empty() {
            return Err(invalid(text, "规则为空".to_string()));
        }
        if tokens.len() > MAX_RULE_TOKENS {
            return Err(invalid(
                text,
                format!("规则过长: {} 个词元（上限 {}）", tokens.len(), MAX_RULE_TOKENS),
            ));
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.parse_or().map_err(|message| invalid(text, message))?;
        if parser.pos < parser.tokens.len() {
            return Err(invalid(
                text,
                format!("多余的内容: {}", parser.tokens[parser.pos]),
            ));
        }

        Ok(Self {
            text: text.trim().to_string(),
            expr,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn expr(&self) -> &IssueExpr {
        &self.expr
    }

    /// 判定某次生产是否算问题
    pub fn is_issue(&self, ctx: &IssueContext<'_>) -> bool {
        self.expr.evaluate(ctx)
    }
}

impl Default for IssueRule {
    fn default() -> Self {
        Self {
            text: DEFAULT_ISSUE_RULE.to_string(),
            expr: IssueExpr::Compare {
                field: IssueField::LineIssueFlag,
                op: CompareOp::Eq,
                value: Literal::Bool(true),
            },
        }
    }
}

fn invalid(rule: &str, message: String) -> ReconcileError {
    ReconcileError::InvalidIssueRule {
        rule: rule.to_string(),
        message,
    }
}

// ==========================================
// 词法
// ==========================================
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Op(CompareOp),
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => write!(f, "{}", w),
            Token::Quoted(q) => write!(f, "{:?}", q),
            Token::Op(op) => write!(f, "{}", op),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            _ if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != quote {
                    end += 1;
                }
                if end >= chars.len() {
                    return Err("引号未闭合".to_string());
                }
                tokens.push(Token::Quoted(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('=', Some('=')) => (CompareOp::Eq, 2),
                    ('=', _) => (CompareOp::Eq, 1),
                    ('!', Some('=')) => (CompareOp::Ne, 2),
                    ('<', Some('>')) => (CompareOp::Ne, 2),
                    ('<', Some('=')) => (CompareOp::Le, 2),
                    ('<', _) => (CompareOp::Lt, 1),
                    ('>', Some('=')) => (CompareOp::Ge, 2),
                    ('>', _) => (CompareOp::Gt, 1),
                    _ => return Err(format!("无法识别的运算符: {}", c)),
                };
                tokens.push(Token::Op(op));
                i += width;
            }
            _ if is_word_char(c) => {
                let start = i;
                while i < chars.len() && is_word_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
            _ => return Err(format!("无法识别的字符: {:?}", c)),
        }
    }

    Ok(tokens)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '-'
}

// ==========================================
// 语法
// ==========================================
/// 单条规则的词元上限
const MAX_RULE_TOKENS: usize = 1024;

/// NOT / 括号的最大嵌套层数（递归下降，超限直接拒绝）
const MAX_NESTING_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.tokens.get(self.pos), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<IssueExpr, String> {
        let mut left = self.parse_and()?;
        while self.peek_keyword("or") {
            self.pos += 1;
            let right = self.parse_and()?;
            left = IssueExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<IssueExpr, String> {
        let mut left = self.parse_unary()?;
        while self.peek_keyword("and") {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = IssueExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<IssueExpr, String> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(format!("嵌套层数超过上限 {}", MAX_NESTING_DEPTH));
        }
        self.depth += 1;
        let expr = self.parse_unary_inner();
        self.depth -= 1;
        expr
    }

    fn parse_unary_inner(&mut self) -> Result<IssueExpr, String> {
        if self.peek_keyword("not") {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(IssueExpr::Not(Box::new(inner)));
        }

        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("缺少右括号".to_string()),
                }
            }
            Some(Token::Word(name)) => self.parse_comparison(&name),
            Some(other) => Err(format!("期望字段名，实际为 {}", other)),
            None => Err("表达式不完整".to_string()),
        }
    }

    fn parse_comparison(&mut self, name: &str) -> Result<IssueExpr, String> {
        let field = IssueField::parse(name).ok_or_else(|| format!("未知字段: {}", name))?;

        let op = match self.next() {
            Some(Token::Op(op)) => op,
            _ => return Err(format!("字段 {} 后缺少比较运算符", name)),
        };

        let raw = match self.next() {
            Some(Token::Word(w)) => w,
            Some(Token::Quoted(q)) => q,
            _ => return Err(format!("字段 {} 缺少比较值", name)),
        };

        let value = literal_for(field, op, &raw)?;
        Ok(IssueExpr::Compare { field, op, value })
    }
}

fn literal_for(field: IssueField, op: CompareOp, raw: &str) -> Result<Literal, String> {
    let kind = field.kind();
    if kind != FieldKind::Number && !op.is_equality() {
        return Err(format!("字段 {:?} 只支持 = / !=", field));
    }

    match kind {
        FieldKind::Bool => match raw.to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Literal::Bool(true)),
            "false" | "no" | "0" => Ok(Literal::Bool(false)),
            _ => Err(format!("布尔值无效: {}", raw)),
        },
        FieldKind::Result => {
            if raw.eq_ignore_ascii_case("none") {
                return Ok(Literal::Result(None));
            }
            InspectionResult::parse(raw)
                .map(|r| Literal::Result(Some(r)))
                .ok_or_else(|| format!("质检结果无效: {}（pass/fail/conditional/none）", raw))
        }
        FieldKind::Number => raw
            .parse::<f64>()
            .map(Literal::Number)
            .map_err(|_| format!("数值无效: {}", raw)),
        FieldKind::Text => Ok(Literal::Text(raw.trim().to_lowercase())),
    }
}
