use crate::process::{CommandResult, CommandRunner, Invocation};
use crate::RuntimeError;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Exit code returned for invocations no rule matches.
pub const UNMATCHED_EXIT_CODE: i32 = 127;

type Action = Arc<dyn Fn(&Invocation) -> io::Result<()> + Send + Sync>;

struct Rule {
    program: PathBuf,
    prefix: Vec<String>,
    result: CommandResult,
    action: Option<Action>,
}

impl Rule {
    fn matches(&self, invocation: &Invocation) -> bool {
        invocation.program == self.program && invocation.args.starts_with(&self.prefix)
    }
}

/// Scripted [`CommandRunner`] for tests.
///
/// Rules match on program path and a leading slice of the arguments; the
/// most recently added matching rule wins. A rule may carry an action that
/// runs before the canned result is returned, which is how tests simulate
/// side effects such as `unzip` writing files or `hdiutil` creating a mount
/// point. Every invocation is recorded.
#[derive(Default)]
pub struct MockRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Invocation>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RuntimeError> {
    mutex
        .lock()
        .map_err(|e| RuntimeError::StatePoisoned(format!("mock runner: {e}")))
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, program: impl AsRef<Path>, prefix: &[&str], result: CommandResult) -> &Self {
        self.push(program.as_ref(), prefix, result, None);
        self
    }

    pub fn on_with<F>(
        &self,
        program: impl AsRef<Path>,
        prefix: &[&str],
        result: CommandResult,
        action: F,
    ) -> &Self
    where
        F: Fn(&Invocation) -> io::Result<()> + Send + Sync + 'static,
    {
        self.push(program.as_ref(), prefix, result, Some(Arc::new(action)));
        self
    }

    fn push(&self, program: &Path, prefix: &[&str], result: CommandResult, action: Option<Action>) {
        let rule = Rule {
            program: program.to_path_buf(),
            prefix: prefix.iter().map(|s| (*s).to_owned()).collect(),
            result,
            action,
        };
        // Test setup only; a poisoned lock means an earlier test thread panicked.
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(rule);
        }
    }

    /// Every invocation seen so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Invocations of `program` whose arguments start with `prefix`.
    pub fn calls_to(&self, program: impl AsRef<Path>, prefix: &[&str]) -> Vec<Invocation> {
        let program = program.as_ref();
        self.calls()
            .into_iter()
            .filter(|inv| {
                inv.program == program
                    && inv.args.len() >= prefix.len()
                    && inv.args.iter().zip(prefix).all(|(a, p)| a == p)
            })
            .collect()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandResult, RuntimeError> {
        lock(&self.calls)?.push(invocation.clone());

        let matched = {
            let rules = lock(&self.rules)?;
            rules
                .iter()
                .rev()
                .find(|rule| rule.matches(invocation))
                .map(|rule| (rule.result.clone(), rule.action.clone()))
        };

        match matched {
            Some((result, action)) => {
                if let Some(action) = action {
                    action(invocation)?;
                }
                Ok(result)
            }
            None => Ok(CommandResult::failed(
                UNMATCHED_EXIT_CODE,
                format!("mock: no rule for {invocation}"),
            )),
        }
    }
}
