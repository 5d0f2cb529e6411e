//! The SpellScript tree-walking interpreter.
//!
//! A spell executes directly from its statement strings: the driver
//! validates the grimoire brackets and walks the top-level statements, and
//! every handler re-parses its own statement against a fixed surface
//! pattern. Nested blocks (loop bodies, traversals, ritual bodies) run as
//! execution contexts pushed onto a context stack; the statement cursor
//! and the block collector always consult the top of that stack first and
//! fall back to the top-level stream when it is empty.

use crate::error::SpellError;
use crate::host::Host;
use crate::parser::{
    find_ci, parse_number, rfind_ci, split_ci, strip_word, tokenize, whispers_literal,
};
use crate::value::Value;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A user-defined subroutine.
#[derive(Debug, Clone)]
pub struct Ritual {
    /// Ordered parameter names, compared case-sensitively.
    pub params: Vec<String>,
    /// Body statements, collected at definition time.
    pub body: Vec<String>,
}

/// A nested block being executed: its statements and a cursor into them.
#[derive(Debug)]
struct Context {
    body: Vec<String>,
    cursor: usize,
}

/// Interpreter state for one spell run.
pub struct Interpreter<H: Host> {
    host: H,
    /// The single process-wide variable environment. Ritual calls shadow
    /// their parameter names and restore them on exit; nothing else is
    /// scoped.
    pub(crate) variables: HashMap<String, Value>,
    /// Ritual table; redefinition replaces.
    pub(crate) rituals: HashMap<String, Ritual>,
    /// Stack of execution contexts for nested blocks.
    contexts: Vec<Context>,
    /// Top-level statement stream.
    statements: Vec<String>,
    /// Cursor over the top-level stream.
    cursor: usize,
}

impl<H: Host> Interpreter<H> {
    /// Create an interpreter that performs its I/O through `host`.
    pub fn new(host: H) -> Self {
        Self {
            host,
            variables: HashMap::new(),
            rituals: HashMap::new(),
            contexts: Vec::new(),
            statements: Vec::new(),
            cursor: 0,
        }
    }

    /// Consume the interpreter and hand back its host.
    pub fn into_host(self) -> H {
        self.host
    }

    /// Depth of the active block-context stack. Zero whenever no spell is
    /// mid-flight.
    pub fn context_depth(&self) -> usize {
        self.contexts.len()
    }

    /// Tokenize and execute a whole spell.
    ///
    /// The first statement must contain `begin the grimoire` and the last
    /// `close the grimoire` (case-insensitively); everything between is
    /// interpreted in order.
    pub fn cast_spell(&mut self, source: &str) -> Result<(), SpellError> {
        let statements = tokenize(source);
        if statements.is_empty() {
            return Err(SpellError::Syntax("empty spell".to_string()));
        }
        if !statements[0].to_lowercase().contains("begin the grimoire") {
            return Err(SpellError::Syntax(
                "spells must begin with Begin the grimoire".to_string(),
            ));
        }
        if !statements[statements.len() - 1].to_lowercase().contains("close the grimoire") {
            return Err(SpellError::Syntax(
                "spells must end with Close the grimoire".to_string(),
            ));
        }
        self.statements = statements;
        self.cursor = 1;
        while self.cursor + 1 < self.statements.len() {
            let statement = self.statements[self.cursor].clone();
            self.cursor += 1;
            self.execute_statement(&statement)?;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Statement stream and block collection
    // ═══════════════════════════════════════════════════════════════════

    /// Pull the next statement from the top context, or from the
    /// top-level stream (stopping short of the closing bracket) when no
    /// block is active.
    fn next_statement(&mut self) -> Option<String> {
        if let Some(context) = self.contexts.last_mut() {
            if context.cursor < context.body.len() {
                let statement = context.body[context.cursor].clone();
                context.cursor += 1;
                return Some(statement);
            }
            return None;
        }
        if self.cursor + 1 < self.statements.len() {
            let statement = self.statements[self.cursor].clone();
            self.cursor += 1;
            return Some(statement);
        }
        None
    }

    /// Gather the statements of a nested block up to the matching
    /// `terminator`.
    ///
    /// Only nesting of the collector's own kind is tracked: a statement
    /// beginning with `opener` and carrying `to begin` deepens, the
    /// terminator shallows. Running out of statements first is a syntax
    /// error.
    fn collect_block(&mut self, opener: &str, terminator: &str) -> Result<Vec<String>, SpellError> {
        let mut body = Vec::new();
        let mut depth = 0usize;
        loop {
            let Some(statement) = self.next_statement() else {
                return Err(SpellError::Syntax(format!("missing {terminator}")));
            };
            let lowered = statement
                .trim_end_matches(['.', ':'])
                .trim_end()
                .to_lowercase();
            if lowered == terminator {
                if depth == 0 {
                    return Ok(body);
                }
                depth -= 1;
            } else if lowered.starts_with(opener) && lowered.contains("to begin") {
                depth += 1;
            }
            body.push(statement);
        }
    }

    /// Run a block body as a pushed execution context, returning the
    /// first non-absent value a statement propagates.
    fn run_block(&mut self, body: &[String]) -> Result<Value, SpellError> {
        self.contexts.push(Context { body: body.to_vec(), cursor: 0 });
        let result = self.run_context();
        self.contexts.pop();
        result
    }

    fn run_context(&mut self) -> Result<Value, SpellError> {
        loop {
            let Some(statement) = self.next_statement() else {
                return Ok(Value::Absent);
            };
            let value = self.execute_statement(&statement)?;
            if !matches!(value, Value::Absent) {
                return Ok(value);
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Dispatch
    // ═══════════════════════════════════════════════════════════════════

    /// Execute one statement. The returned value is Absent unless the
    /// statement (or a block it ran) hit a `Return`.
    pub(crate) fn execute_statement(&mut self, statement: &str) -> Result<Value, SpellError> {
        let statement = statement.trim().trim_end_matches(['.', ':']).trim_end();
        if statement.is_empty() {
            return Ok(Value::Absent);
        }
        let lowered = statement.to_lowercase();
        if lowered.contains("if the signs show") {
            return self.handle_conditional(statement);
        }
        if lowered.contains("repeat the incantation") {
            return self.handle_repeat(statement);
        }
        let keyword = lowered.split_whitespace().next().unwrap_or_default();
        match keyword {
            "traverse" => self.handle_traverse(statement),
            "summon" => self.handle_summon(statement),
            "enchant" => self.handle_enchant(statement),
            "inscribe" => self.handle_inscribe(statement),
            "inquire" => self.handle_inquire(statement),
            "append" => self.handle_append(statement),
            "ponder" => self.handle_ponder(statement),
            "banish" => self.handle_banish(statement),
            "gaze" => self.handle_gaze(statement),
            "transmute" => self.handle_transmute(statement),
            "conjure" => self.handle_conjure(statement),
            "invoke" => self.handle_invoke(statement),
            "return" => self.handle_return(statement),
            _ => Err(SpellError::Syntax(format!("unknown incantation {keyword}"))),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Control flow
    // ═══════════════════════════════════════════════════════════════════

    /// `If the signs show <condition> then <statement> [otherwise <statement>]`
    ///
    /// The filler word `is` is stripped from the condition before
    /// evaluation, wherever it appears.
    fn handle_conditional(&mut self, statement: &str) -> Result<Value, SpellError> {
        const USAGE: &str =
            "use If the signs show <condition> then <statement> [otherwise <statement>]";
        let after = match find_ci(statement, "if the signs show") {
            Some(at) => &statement[at + "if the signs show".len()..],
            None => return Err(SpellError::Syntax(USAGE.to_string())),
        };
        let Some(then_at) = find_ci(after, " then ") else {
            return Err(SpellError::Syntax(USAGE.to_string()));
        };
        let condition = strip_word(&after[..then_at], "is");
        let branches = &after[then_at + " then ".len()..];
        let (consequent, alternate) = match find_ci(branches, " otherwise ") {
            Some(at) => (&branches[..at], Some(&branches[at + " otherwise ".len()..])),
            None => (branches, None),
        };
        if self.evaluate_condition(condition.trim())? {
            self.execute_statement(consequent)
        } else if let Some(alternate) = alternate {
            self.execute_statement(alternate)
        } else {
            Ok(Value::Absent)
        }
    }

    /// `Repeat the incantation <count> times [do <statements>] ... end loop`
    fn handle_repeat(&mut self, statement: &str) -> Result<Value, SpellError> {
        const USAGE: &str = "use Repeat the incantation <count> times [do <statements>]";
        let after = match find_ci(statement, "repeat the incantation") {
            Some(at) => &statement[at + "repeat the incantation".len()..],
            None => return Err(SpellError::Syntax(USAGE.to_string())),
        };
        let mut words = after.split_whitespace();
        let count: usize = match words.next().and_then(|w| w.parse().ok()) {
            Some(count) => count,
            None => return Err(SpellError::Syntax(USAGE.to_string())),
        };
        if words.next().map(|w| w.eq_ignore_ascii_case("times")) != Some(true) {
            return Err(SpellError::Syntax(USAGE.to_string()));
        }

        // The inline body splits on plain ". " and does not respect
        // whispers; quoted periods belong to block-form loops.
        let mut body: Vec<String> = Vec::new();
        if let Some(do_at) = find_ci(after, " do ") {
            body = after[do_at + " do ".len()..]
                .split(". ")
                .map(|s| s.trim().trim_end_matches(['.', ':']).trim_end().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if body.is_empty() {
            body = self.collect_block("repeat the incantation", "end loop")?;
        }
        if body.is_empty() {
            return Err(SpellError::Syntax("empty loop body".to_string()));
        }

        for _ in 0..count {
            let value = self.run_block(&body)?;
            if !matches!(value, Value::Absent) {
                return Ok(value);
            }
        }
        Ok(Value::Absent)
    }

    /// `Traverse <collection> with each <item> [at <index>] to begin: ... end traverse`
    fn handle_traverse(&mut self, statement: &str) -> Result<Value, SpellError> {
        const USAGE: &str =
            "use Traverse <collection> with each <item> [at <index>] to begin: ... end traverse";
        let Some(begin_at) = find_ci(statement, "to begin") else {
            return Err(SpellError::Syntax(USAGE.to_string()));
        };
        let header = &statement[..begin_at];
        let words: Vec<&str> = header.split_whitespace().collect();
        if words.len() < 5
            || !words[0].eq_ignore_ascii_case("traverse")
            || !words[2].eq_ignore_ascii_case("with")
            || !words[3].eq_ignore_ascii_case("each")
        {
            return Err(SpellError::Syntax(USAGE.to_string()));
        }
        let collection_name = words[1];
        let item_name = words[4];
        let index_name = match words.get(5) {
            None => None,
            Some(w) if w.eq_ignore_ascii_case("at") && words.len() == 7 => Some(words[6]),
            Some(_) => return Err(SpellError::Syntax(USAGE.to_string())),
        };

        let body = self.collect_block("traverse ", "end traverse")?;
        let collection = self.expect_collection(collection_name)?;

        let saved_item = self.variables.get(item_name).cloned();
        let saved_index = index_name.and_then(|n| self.variables.get(n).cloned());

        let mut outcome = Ok(Value::Absent);
        let mut position = 0usize;
        loop {
            let element = {
                let items = collection.borrow();
                match items.get(position) {
                    Some(element) => element.clone(),
                    None => break,
                }
            };
            self.variables.insert(item_name.to_string(), element);
            if let Some(index_name) = index_name {
                self.variables
                    .insert(index_name.to_string(), Value::Integer(BigInt::from(position)));
            }
            match self.run_block(&body) {
                Ok(Value::Absent) => position += 1,
                other => {
                    outcome = other;
                    break;
                }
            }
        }

        restore_binding(&mut self.variables, item_name, saved_item);
        if let Some(index_name) = index_name {
            restore_binding(&mut self.variables, index_name, saved_index);
        }
        outcome
    }

    // ═══════════════════════════════════════════════════════════════════
    // Primitive statements
    // ═══════════════════════════════════════════════════════════════════

    /// `Summon the <name> [with essence of <value>]`
    fn handle_summon(&mut self, statement: &str) -> Result<Value, SpellError> {
        let words: Vec<&str> = statement.split_whitespace().collect();
        if words.len() < 3 || !words[1].eq_ignore_ascii_case("the") {
            return Err(SpellError::Syntax(
                "use Summon the <name> [with essence of <value>]".to_string(),
            ));
        }
        let name = words[2];
        let value = match find_ci(statement, "with essence of") {
            Some(at) => {
                self.evaluate_expression(statement[at + "with essence of".len()..].trim())?
            }
            None => Value::Absent,
        };
        self.variables.insert(name.to_string(), value);
        Ok(Value::Absent)
    }

    /// `Enchant <name> with <value>`, `Enchant <name> through ritual <call>`,
    /// or `Enchant <name> at position <position> with <value>`.
    fn handle_enchant(&mut self, statement: &str) -> Result<Value, SpellError> {
        let words: Vec<&str> = statement.split_whitespace().collect();
        if words.len() < 3 {
            return Err(SpellError::Syntax("use Enchant <name> with <value>".to_string()));
        }
        let name = words[1];

        // Indexed write: `at position` ahead of its `with`.
        if let (Some(pos_at), Some(with_at)) =
            (find_ci(statement, " at position "), find_ci(statement, " with "))
        {
            if pos_at < with_at {
                let after = &statement[pos_at + " at position ".len()..];
                let Some(inner_with) = find_ci(after, " with ") else {
                    return Err(SpellError::Syntax(
                        "use Enchant <name> at position <position> with <value>".to_string(),
                    ));
                };
                let collection = self.expect_collection(name)?;
                let index = self.expect_position(&after[..inner_with])?;
                let value = self.evaluate_expression(&after[inner_with + " with ".len()..])?;
                let mut items = collection.borrow_mut();
                let length = items.len();
                match usize::try_from(index).ok().and_then(|i| items.get_mut(i)) {
                    Some(slot) => *slot = value,
                    None => {
                        return Err(SpellError::Index(format!(
                            "position {index} is beyond a collection of length {length}"
                        )))
                    }
                }
                return Ok(Value::Absent);
            }
        }

        if let Some(at) = find_ci(statement, " through ritual ") {
            let value = self.evaluate_expression(statement[at + 1..].trim())?;
            return self.rebind(name, value);
        }

        let Some(with_at) = find_ci(statement, " with ") else {
            return Err(SpellError::Syntax("enchant requires with".to_string()));
        };
        let value = self.evaluate_expression(statement[with_at + " with ".len()..].trim())?;
        self.rebind(name, value)
    }

    /// Rebind an existing variable; creating is Summon's job.
    fn rebind(&mut self, name: &str, value: Value) -> Result<Value, SpellError> {
        if !self.variables.contains_key(name) {
            return Err(SpellError::Name(format!("unknown entity {name}")));
        }
        self.variables.insert(name.to_string(), value);
        Ok(Value::Absent)
    }

    /// `Append <value> to <name>`
    fn handle_append(&mut self, statement: &str) -> Result<Value, SpellError> {
        const USAGE: &str = "use Append <value> to <name>";
        let rest = after_keyword(statement);
        let Some(to_at) = rfind_ci(rest, " to ") else {
            return Err(SpellError::Syntax(USAGE.to_string()));
        };
        let name = rest[to_at + " to ".len()..].trim();
        if name.is_empty() || name.split_whitespace().count() != 1 {
            return Err(SpellError::Syntax(USAGE.to_string()));
        }
        let collection = self.expect_collection(name)?;
        let value = self.evaluate_expression(rest[..to_at].trim())?;
        collection.borrow_mut().push(value);
        Ok(Value::Absent)
    }

    /// `Banish the <name>`
    fn handle_banish(&mut self, statement: &str) -> Result<Value, SpellError> {
        let words: Vec<&str> = statement.split_whitespace().collect();
        if words.len() != 3 || !words[1].eq_ignore_ascii_case("the") {
            return Err(SpellError::Syntax("use Banish the <name>".to_string()));
        }
        let name = words[2];
        if self.variables.remove(name).is_none() {
            return Err(SpellError::Name(format!("unknown entity {name}")));
        }
        Ok(Value::Absent)
    }

    /// `Inscribe whispers of "<text>"` or `Inscribe <expression>`.
    ///
    /// A failing expression is not an error here: the raw remainder is
    /// inscribed unchanged, as the surface has always done.
    fn handle_inscribe(&mut self, statement: &str) -> Result<Value, SpellError> {
        let message = after_keyword(statement);
        if let Some(text) = whispers_literal(message) {
            self.host.print_line(text);
            return Ok(Value::Absent);
        }
        match self.evaluate_expression(message) {
            Ok(value) => self.host.print_line(&value.to_string()),
            Err(_) => self.host.print_line(message),
        }
        Ok(Value::Absent)
    }

    /// `Inquire whispers of "<prompt>" into <name>`
    fn handle_inquire(&mut self, statement: &str) -> Result<Value, SpellError> {
        const USAGE: &str = "use Inquire whispers of \"<prompt>\" into <name>";
        let rest = after_keyword(statement);
        let Some(open) = find_ci(rest, "whispers of \"") else {
            return Err(SpellError::Syntax(USAGE.to_string()));
        };
        let after_open = &rest[open + "whispers of \"".len()..];
        let Some(close) = after_open.find('"') else {
            return Err(SpellError::Syntax(USAGE.to_string()));
        };
        let prompt = after_open[..close].to_string();
        let tail = &after_open[close + 1..];
        let Some(into_at) = find_ci(tail, " into ") else {
            return Err(SpellError::Syntax(USAGE.to_string()));
        };
        let name = tail[into_at + " into ".len()..].trim();
        if name.is_empty() || name.split_whitespace().count() != 1 {
            return Err(SpellError::Syntax(USAGE.to_string()));
        }
        let line = self.host.read_line(&prompt);
        self.variables.insert(name.to_string(), Value::Text(line));
        Ok(Value::Absent)
    }

    /// `Ponder for <moments> moments`
    fn handle_ponder(&mut self, statement: &str) -> Result<Value, SpellError> {
        const USAGE: &str = "use Ponder for <seconds> moments";
        let words: Vec<&str> = statement.split_whitespace().collect();
        if words.len() < 4
            || !words[1].eq_ignore_ascii_case("for")
            || !words[words.len() - 1].eq_ignore_ascii_case("moments")
        {
            return Err(SpellError::Syntax(USAGE.to_string()));
        }
        let literal = words[2..words.len() - 1].join(" ");
        let moments = parse_number(&literal)?.as_float().unwrap_or(0.0);
        self.host.sleep(moments);
        Ok(Value::Absent)
    }

    /// `Gaze upon <condition>`
    fn handle_gaze(&mut self, statement: &str) -> Result<Value, SpellError> {
        let words: Vec<&str> = statement.split_whitespace().collect();
        if words.len() < 3 || !words[1].eq_ignore_ascii_case("upon") {
            return Err(SpellError::Syntax("use Gaze upon <condition>".to_string()));
        }
        let condition = after_keyword(after_keyword(statement));
        let truth = self.evaluate_condition(condition)?;
        let line = format!("Gazing reveals: {}", Value::Truth(truth));
        self.host.print_line(&line);
        Ok(Value::Absent)
    }

    /// `Transmute <name> into number|text|truth`
    ///
    /// The source may be any expression; only a bound name is rebound to
    /// the transmuted value.
    fn handle_transmute(&mut self, statement: &str) -> Result<Value, SpellError> {
        const USAGE: &str = "use Transmute <name> into number, text, or truth";
        let rest = after_keyword(statement);
        let Some(into_at) = rfind_ci(rest, " into ") else {
            return Err(SpellError::Syntax(USAGE.to_string()));
        };
        let source = rest[..into_at].trim();
        let target = rest[into_at + " into ".len()..].trim().to_lowercase();
        let value = match self.variables.get(source) {
            Some(bound) => bound.clone(),
            None => self.evaluate_expression(source)?,
        };
        let transmuted = match target.as_str() {
            "number" => parse_number(&value.to_string()).map_err(|_| {
                SpellError::Value(format!("cannot transmute {value} into a number"))
            })?,
            "text" => Value::Text(value.to_string()),
            "truth" => Value::Truth(value.truthy()),
            _ => return Err(SpellError::Syntax(USAGE.to_string())),
        };
        if self.variables.contains_key(source) {
            self.variables.insert(source.to_string(), transmuted);
        }
        Ok(Value::Absent)
    }

    /// `Return <expression>`
    fn handle_return(&mut self, statement: &str) -> Result<Value, SpellError> {
        let expression = after_keyword(statement);
        if expression.is_empty() {
            return Ok(Value::Absent);
        }
        self.evaluate_expression(expression)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Rituals
    // ═══════════════════════════════════════════════════════════════════

    /// `Conjure ritual named <name> [with <parameters>] to begin: ... end ritual`,
    /// or the inline form `... to <statement>` for a one-statement body.
    fn handle_conjure(&mut self, statement: &str) -> Result<Value, SpellError> {
        const USAGE: &str =
            "use Conjure ritual named <name> with <parameters> to begin: ... end ritual";
        let Some(named_at) = find_ci(statement, "ritual named ") else {
            return Err(SpellError::Syntax(USAGE.to_string()));
        };
        let rest = &statement[named_at + "ritual named ".len()..];
        let Some(name) = rest.split_whitespace().next() else {
            return Err(SpellError::Syntax(USAGE.to_string()));
        };
        let after_name = &rest[name.len()..];

        let block_header = rfind_ci(after_name, "to begin")
            .filter(|&at| after_name[at + "to begin".len()..].trim().is_empty());
        let (params, body) = if let Some(begin_at) = block_header {
            let params = parse_parameters(&after_name[..begin_at]);
            let body = self.collect_block("conjure ritual named", "end ritual")?;
            (params, body)
        } else if let Some(to_at) = find_ci(after_name, " to ") {
            let params = parse_parameters(&after_name[..to_at]);
            let single = after_name[to_at + " to ".len()..].trim();
            if single.is_empty() {
                return Err(SpellError::Syntax(USAGE.to_string()));
            }
            (params, vec![single.to_string()])
        } else {
            return Err(SpellError::Syntax(USAGE.to_string()));
        };

        self.rituals.insert(name.to_string(), Ritual { params, body });
        Ok(Value::Absent)
    }

    /// `Invoke the ritual <name> [with <arguments>]`. The statement form
    /// discards the ritual's return value.
    fn handle_invoke(&mut self, statement: &str) -> Result<Value, SpellError> {
        const USAGE: &str = "use Invoke the ritual <name> [with <arguments>]";
        let Some(at) = find_ci(statement, " the ritual ") else {
            return Err(SpellError::Syntax(USAGE.to_string()));
        };
        let rest = &statement[at + " the ritual ".len()..];
        let (name, arguments) = match find_ci(rest, " with ") {
            Some(with_at) => (rest[..with_at].trim(), Some(&rest[with_at + " with ".len()..])),
            None => (rest.trim(), None),
        };
        if name.is_empty() || name.split_whitespace().count() != 1 {
            return Err(SpellError::Syntax(USAGE.to_string()));
        }
        self.call_ritual(name, arguments.map(|a| a.trim()))?;
        Ok(Value::Absent)
    }

    /// Invoke a ritual by name.
    ///
    /// Arguments split on `and`. An argument that is exactly a bound
    /// variable name is marked for write-back: after the body runs, the
    /// parameter's final value is copied back into that variable. The
    /// parameters themselves are shadowed for the duration of the call
    /// and restored afterwards.
    pub(crate) fn call_ritual(
        &mut self,
        name: &str,
        arguments: Option<&str>,
    ) -> Result<Value, SpellError> {
        let ritual = match self.rituals.get(name) {
            Some(ritual) => ritual.clone(),
            None => return Err(SpellError::Name(format!("unknown ritual {name}"))),
        };

        let mut values = Vec::new();
        let mut writeback = Vec::new();
        if let Some(arguments) = arguments {
            for (position, raw) in split_ci(arguments, " and ").iter().enumerate() {
                let raw = raw.trim();
                if self.variables.contains_key(raw) {
                    writeback.push((raw.to_string(), position));
                }
                values.push(self.evaluate_expression(raw)?);
            }
        }
        if values.len() != ritual.params.len() {
            return Err(SpellError::Value(format!(
                "ritual {name} takes {} arguments but {} were given",
                ritual.params.len(),
                values.len()
            )));
        }

        let saved: Vec<(String, Option<Value>)> = ritual
            .params
            .iter()
            .map(|param| (param.clone(), self.variables.get(param).cloned()))
            .collect();
        for (param, value) in ritual.params.iter().zip(values) {
            self.variables.insert(param.clone(), value);
        }

        let result = self.run_block(&ritual.body);

        // Capture write-back values before the parameters are restored,
        // apply them after, so a caller variable sharing a parameter's
        // name still observes the write-back.
        let written: Vec<(String, Option<Value>)> = writeback
            .into_iter()
            .map(|(argument, position)| {
                let current = self.variables.get(&ritual.params[position]).cloned();
                (argument, current)
            })
            .collect();
        for (param, prior) in saved {
            restore_binding(&mut self.variables, &param, prior);
        }
        for (argument, value) in written {
            if let Some(value) = value {
                self.variables.insert(argument, value);
            }
        }
        result
    }

    // ═══════════════════════════════════════════════════════════════════
    // Shared lookups
    // ═══════════════════════════════════════════════════════════════════

    /// Look up `name` as a bound collection.
    pub(crate) fn expect_collection(
        &self,
        name: &str,
    ) -> Result<Rc<RefCell<Vec<Value>>>, SpellError> {
        match self.variables.get(name) {
            Some(Value::List(items)) => Ok(Rc::clone(items)),
            Some(_) => Err(SpellError::Type(format!("{name} is not a collection"))),
            None => Err(SpellError::Name(format!("unknown entity {name}"))),
        }
    }

    /// Evaluate an index expression to a machine integer.
    pub(crate) fn expect_position(&mut self, expression: &str) -> Result<i64, SpellError> {
        match self.evaluate_expression(expression.trim())? {
            Value::Integer(n) => n.to_i64().ok_or_else(|| {
                SpellError::Index(format!("position {n} is beyond any collection"))
            }),
            _ => Err(SpellError::Type(
                "collection positions must be whole numbers".to_string(),
            )),
        }
    }
}

/// The statement text after its leading keyword.
fn after_keyword(statement: &str) -> &str {
    match statement.find(char::is_whitespace) {
        Some(at) => statement[at..].trim_start(),
        None => "",
    }
}

/// Parameter names from a conjure header: everything after `with`, split
/// on `and`.
fn parse_parameters(header: &str) -> Vec<String> {
    match find_ci(header, "with ") {
        Some(at) => split_ci(&header[at + "with ".len()..], " and ")
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        None => Vec::new(),
    }
}

/// Put a saved binding back: reinstate the prior value, or remove the
/// name when there was none.
fn restore_binding(variables: &mut HashMap<String, Value>, name: &str, saved: Option<Value>) {
    match saved {
        Some(value) => {
            variables.insert(name.to_string(), value);
        }
        None => {
            variables.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ScriptedHost;

    fn interpreter() -> Interpreter<ScriptedHost> {
        Interpreter::new(ScriptedHost::default())
    }

    #[test]
    fn test_unknown_incantation() {
        let mut interp = interpreter();
        let err = interp.execute_statement("Mumble something.").unwrap_err();
        assert_eq!(err, SpellError::Syntax("unknown incantation mumble".to_string()));
    }

    #[test]
    fn test_summon_without_essence_binds_absent() {
        let mut interp = interpreter();
        interp.execute_statement("Summon the shade.").unwrap();
        assert!(matches!(interp.variables.get("shade"), Some(Value::Absent)));
    }

    #[test]
    fn test_enchant_requires_existing_binding() {
        let mut interp = interpreter();
        let err = interp.execute_statement("Enchant ghost with 3.").unwrap_err();
        assert_eq!(err, SpellError::Name("unknown entity ghost".to_string()));
    }

    #[test]
    fn test_banish_removes_binding() {
        let mut interp = interpreter();
        interp.execute_statement("Summon the wisp with essence of 1.").unwrap();
        interp.execute_statement("Banish the wisp.").unwrap();
        assert!(interp.variables.get("wisp").is_none());
        let err = interp.execute_statement("Banish the wisp.").unwrap_err();
        assert!(matches!(err, SpellError::Name(_)));
    }

    #[test]
    fn test_ponder_reports_to_host() {
        let mut interp = interpreter();
        interp.execute_statement("Ponder for 2 moments.").unwrap();
        interp.execute_statement("Ponder for 0 point 5 moments.").unwrap();
        assert!((interp.into_host().slept - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_ponder_rejects_non_numbers() {
        let mut interp = interpreter();
        let err = interp.execute_statement("Ponder for ages moments.").unwrap_err();
        assert!(matches!(err, SpellError::Value(_)));
    }

    #[test]
    fn test_conjure_inline_form_stores_single_statement() {
        let mut interp = interpreter();
        interp
            .execute_statement("Conjure ritual named shout with w to Inscribe w.")
            .unwrap();
        let ritual = interp.rituals.get("shout").unwrap();
        assert_eq!(ritual.params, vec!["w".to_string()]);
        assert_eq!(ritual.body, vec!["Inscribe w".to_string()]);
    }

    #[test]
    fn test_ritual_arity_mismatch() {
        let mut interp = interpreter();
        interp
            .execute_statement("Conjure ritual named pair with a and b to Return a.")
            .unwrap();
        let err = interp.call_ritual("pair", Some("1")).unwrap_err();
        assert_eq!(
            err,
            SpellError::Value("ritual pair takes 2 arguments but 1 were given".to_string())
        );
    }

    #[test]
    fn test_call_of_unknown_ritual() {
        let mut interp = interpreter();
        let err = interp.call_ritual("vanish", None).unwrap_err();
        assert_eq!(err, SpellError::Name("unknown ritual vanish".to_string()));
    }
}
