//! SK-023: Stock effects: changers, broadcast and exit.

use super::types::StockTypes;
use crate::core::executor::{Effect, ExitScope, Frame, RuntimeError, SectionKind};
use crate::core::expr::Expr;
use crate::core::matcher::{BuildContext, ParsedOperation};
use crate::core::registry::{Registry, RegistryBuilder, RegistryError};
use crate::core::types::{with_article, ChangeMode};

// ============================================================================
// Change
// ============================================================================

pub struct Change {
    target: Expr,
    delta: Option<Expr>,
    mode: ChangeMode,
}

impl Effect for Change {
    fn execute(&self, frame: &mut Frame<'_>) -> Result<(), RuntimeError> {
        let delta = match &self.delta {
            Some(expr) => expr.evaluate_many(frame)?,
            None => Vec::new(),
        };
        self.target.change(frame, &delta, self.mode)
    }

    fn describe(&self, registry: &Registry) -> String {
        let target = self.target.describe(registry);
        let delta = self
            .delta
            .as_ref()
            .map(|d| d.describe(registry))
            .unwrap_or_default();
        match self.mode {
            ChangeMode::Set => format!("set {} to {}", target, delta),
            ChangeMode::Add => format!("add {} to {}", delta, target),
            ChangeMode::Remove => format!("remove {} from {}", delta, target),
            ChangeMode::Clear => format!("clear {}", target),
        }
    }
}

/// Slots of the delta and the target in each change pattern.
fn change_slots(mode: ChangeMode) -> (Option<usize>, usize) {
    match mode {
        ChangeMode::Set => (Some(1), 0),
        ChangeMode::Add | ChangeMode::Remove => (Some(0), 1),
        ChangeMode::Clear => (None, 0),
    }
}

fn build_change(
    mut op: ParsedOperation,
    ctx: &BuildContext<'_>,
    mode: ChangeMode,
) -> Result<Box<dyn Effect>, String> {
    let registry = ctx.registry;
    let (delta_slot, target_slot) = change_slots(mode);
    let target = op.take_expr(target_slot).ok_or("nothing to change")?;
    let spec = target.accepts_change(mode).ok_or_else(|| {
        format!("{} can't be {}", target.describe(registry), past_tense(mode))
    })?;

    let delta = match delta_slot {
        None => None,
        Some(slot) => {
            let delta = op.take_expr(slot).ok_or("missing value to change with")?;
            if mode == ChangeMode::Set && !spec.plural && !delta.is_single() {
                return Err(format!(
                    "{} can only be set to one {}, not more",
                    target.describe(registry),
                    registry.type_name(spec.ty)
                ));
            }
            let text = delta.describe(registry);
            let converted = delta.convert_to(registry, spec.ty).ok_or_else(|| {
                format!(
                    "{} is not {}, so it can't be used to {} {}",
                    text,
                    with_article(registry.type_name(spec.ty)),
                    mode,
                    target.describe(registry)
                )
            })?;
            Some(converted)
        }
    };
    Ok(Box::new(Change {
        target,
        delta,
        mode,
    }))
}

fn past_tense(mode: ChangeMode) -> &'static str {
    match mode {
        ChangeMode::Set => "set",
        ChangeMode::Add => "added to",
        ChangeMode::Remove => "removed from",
        ChangeMode::Clear => "cleared",
    }
}

// ============================================================================
// Broadcast
// ============================================================================

pub struct Broadcast {
    messages: Expr,
}

impl Effect for Broadcast {
    fn execute(&self, frame: &mut Frame<'_>) -> Result<(), RuntimeError> {
        let registry = frame.registry();
        for value in self.messages.evaluate_many(frame)? {
            let text = registry.to_text(&value);
            tracing::debug!(message = %text, "broadcast");
            frame.event_mut().broadcast(&text);
        }
        Ok(())
    }

    fn describe(&self, registry: &Registry) -> String {
        format!("broadcast {}", self.messages.describe(registry))
    }
}

// ============================================================================
// Exit
// ============================================================================

pub struct Exit(ExitScope);

impl Effect for Exit {
    fn execute(&self, frame: &mut Frame<'_>) -> Result<(), RuntimeError> {
        frame.exit(self.0);
        Ok(())
    }

    fn describe(&self, _registry: &Registry) -> String {
        match self.0 {
            ExitScope::Trigger => "exit trigger".into(),
            ExitScope::Sections(n) => format!("exit {} section(s)", n),
            ExitScope::Loops(n) => format!("exit {} loop(s)", n),
            ExitScope::Conditionals(n) => format!("exit {} conditional(s)", n),
        }
    }
}

fn build_exit(op: &ParsedOperation, ctx: &BuildContext<'_>) -> Result<Box<dyn Effect>, String> {
    if op.pattern_index() == 0 {
        return Ok(Box::new(Exit(ExitScope::Trigger)));
    }
    let count = match op.regex(0) {
        Some(c) => c
            .text
            .parse::<usize>()
            .map_err(|_| format!("'{}' is not a number of sections", c.text))?,
        None => 1,
    };
    let scope = ctx.scope;
    let (scope_of, noun, available): (fn(usize) -> ExitScope, &str, usize) = match op.mark() {
        1 => (ExitScope::Sections, "section", scope.nested_sections()),
        2 => (ExitScope::Loops, "loop", scope.count(SectionKind::Loop)),
        3 => (
            ExitScope::Conditionals,
            "conditional",
            scope.count(SectionKind::Conditional),
        ),
        _ => return Err(format!("can't understand what to exit in '{}'", op.text())),
    };
    if count == 0 {
        return Err(format!("can't exit 0 {}s", noun));
    }
    if count > available {
        return Err(match available {
            0 => format!("can't exit {} {}(s): this line is not in any {}", count, noun, noun),
            n => format!(
                "can't exit {} {}(s): only {} enclose this line",
                count, noun, n
            ),
        });
    }
    Ok(Box::new(Exit(scope_of(count))))
}

// ============================================================================
// Registration
// ============================================================================

pub fn register(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    StockTypes::lookup(b)?;

    for (name, mode, pattern) in [
        ("set", ChangeMode::Set, "set %objects% to %objects%"),
        ("add", ChangeMode::Add, "add %objects% to %objects%"),
        ("remove", ChangeMode::Remove, "remove %objects% from %objects%"),
        ("clear", ChangeMode::Clear, "(clear|delete|reset) %objects%"),
    ] {
        b.register_effect(name, &[pattern], move |op, ctx| build_change(op, ctx, mode))?;
    }

    b.register_effect("broadcast", &["(broadcast|say) %texts%"], |mut op, _| {
        let messages = op.take_expr(0).ok_or("broadcast what?")?;
        Ok(Box::new(Broadcast { messages }) as Box<dyn Effect>)
    })?;

    b.register_effect(
        "exit",
        &[
            "(exit|stop) [this] [trigger]",
            "(exit|stop) [this] (1¦section|2¦loop|3¦conditional)",
            "(exit|stop) <\\d+> (1¦section|2¦loop|3¦conditional)[s]",
        ],
        |op, ctx| build_exit(&op, ctx),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matcher::{parse_effect, ParseScope};

    fn registry() -> Registry {
        let mut b = RegistryBuilder::new();
        super::super::types::register(&mut b).unwrap();
        super::super::expressions::register(&mut b).unwrap();
        register(&mut b).unwrap();
        b.freeze()
    }

    fn parse(reg: &Registry, scope: &ParseScope, text: &str) -> Result<String, String> {
        let ctx = BuildContext::new(reg, scope);
        parse_effect(text, &ctx)
            .map(|p| p.value.describe(reg))
            .map_err(|d| d.message)
    }

    #[test]
    fn test_sk023_change_validation() {
        let reg = registry();
        let scope = ParseScope::default();
        assert_eq!(parse(&reg, &scope, "set {x} to 5").unwrap(), "set {x} to 5");
        assert_eq!(parse(&reg, &scope, "add 1 to {xs::*}").unwrap(), "add 1 to {xs::*}");
        assert_eq!(parse(&reg, &scope, "delete {x}").unwrap(), "clear {x}");
        assert_eq!(
            parse(&reg, &scope, "set 5 to 6").err().unwrap(),
            "5 can't be set"
        );
        assert_eq!(
            parse(&reg, &scope, "set {x} to 1 and 2").err().unwrap(),
            "{x} can only be set to one object, not more"
        );
        assert_eq!(
            parse(&reg, &scope, "add \"a\" to {x}").err().unwrap(),
            "\"a\" is not a number, so it can't be used to add {x}"
        );
    }

    #[test]
    fn test_sk023_exit_counts_checked_against_scope() {
        let reg = registry();
        let mut scope = ParseScope::default();
        scope.sections.push(SectionKind::Trigger);
        assert_eq!(parse(&reg, &scope, "stop").unwrap(), "exit trigger");
        assert!(parse(&reg, &scope, "exit loop")
            .err()
            .unwrap()
            .contains("not in any loop"));

        scope.sections.push(SectionKind::Loop);
        scope.sections.push(SectionKind::Conditional);
        assert_eq!(parse(&reg, &scope, "exit this loop").unwrap(), "exit 1 loop(s)");
        assert_eq!(parse(&reg, &scope, "exit 2 sections").unwrap(), "exit 2 section(s)");
        assert!(parse(&reg, &scope, "exit 3 sections")
            .err()
            .unwrap()
            .contains("only 2 enclose"));
        assert!(parse(&reg, &scope, "exit 0 loops").is_err());
    }

    #[test]
    fn test_sk023_broadcast_converts_to_text() {
        let reg = registry();
        let scope = ParseScope::default();
        assert_eq!(
            parse(&reg, &scope, "broadcast \"hi\" and 5").unwrap(),
            "broadcast \"hi\" and 5"
        );
    }
}
