//! The shared syntax-tree walker
//!
//! One [`Walker`] drives every pass. It builds scopes and symbols in its own
//! [`SymbolStore`], resolves names, runs the checks the strategy allows and
//! reports each identifier occurrence to the strategy.

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use super::AnalysisEnv;
use super::builtins::{is_builtin, is_builtin_module};
use super::checks::{self, Finding};
use super::narrowing::{NameSet, falsy_when, truthy_when};
use super::pass::{
    DeclKey, NameOccurrence, NameRole, Pass, PassPhase, PassStrategy, PhaseTracker, SymbolClass,
};
use super::scope::{ScopeId, ScopeKind};
use super::symbols::{
    Binding, FunctionId, FunctionSpec, Label, LoadKind, PendingGoto, Reference, ReferenceId,
    ReturnSite, SymbolStore, ValueKind, Variable, VariableFlags, VariableId,
};
use crate::annotation::{FunctionTypes, types_compatible};
use crate::diagnostic::{Diagnostic, DiagnosticSink, ErrorKind, RelatedInfo};
use crate::project::resolver::{self, ModuleMemo, ProjectState};
use crate::project::{AnalysisError, FileId, FileResult};
use crate::syntax::{
    Attrib, BinOp, Block, Exp, ExpKind, Field, FuncName, FunctionBody, IfStat, LocalStat, Name,
    ReturnStat, Stat, StatKind, TableConstructor, TextRange, UnOp,
};

/// Member assignments deeper than `a.b.c` only read their prefix.
const MAX_MEMBER_CHAIN: usize = 3;

const UNUSED_ASSIGN_NOTE: &str = "declared and not used, this just assign";

/// What the walker knows about the value of an expression.
#[derive(Debug, Clone, Copy)]
struct ExpInfo {
    kind: ValueKind,
    var: Option<VariableId>,
    function: Option<FunctionId>,
    reference: Option<ReferenceId>,
}

impl ExpInfo {
    fn of(kind: ValueKind) -> Self {
        Self {
            kind,
            var: None,
            function: None,
            reference: None,
        }
    }

    fn unknown() -> Self {
        Self::of(ValueKind::Unknown)
    }
}

enum Lookup {
    Found(VariableId),
    /// Defined by a file that has not finished running at this point.
    LoadOrder { var: VariableId, origin: RelatedInfo },
    Builtin,
    Unresolved,
}

/// Per-file walk state.
struct FileContext<'e> {
    file: FileId,
    path: &'e str,
    function: FunctionId,
    scope: ScopeId,
    result: FileResult,
    sink: DiagnosticSink<'e>,
    /// Names proven non-nil by enclosing `and`/`or` operands.
    guards: Vec<NameSet>,
    /// Target of an `x = x or default` statement being walked.
    self_ref: Option<String>,
}

pub struct WalkOutput<S> {
    pub store: SymbolStore,
    pub strategy: S,
    /// Live project tables; only the project pass has them.
    pub project: Option<ProjectState>,
}

pub struct Walker<'e, S> {
    env: &'e AnalysisEnv<'e>,
    store: SymbolStore,
    strategy: S,
    project: Option<ProjectState>,
    memo: ModuleMemo,
    phase: PhaseTracker,
    /// Load sites of the files suspended on a nested walk, outermost first.
    load_sites: Vec<(FileId, TextRange)>,
}

impl<'e, S: PassStrategy> Walker<'e, S> {
    pub fn new(env: &'e AnalysisEnv<'e>, strategy: S) -> Self {
        let pass = strategy.pass();
        let project = strategy.recurses_into_imports().then(ProjectState::new);
        Self {
            env,
            store: SymbolStore::new(),
            strategy,
            project,
            memo: ModuleMemo::default(),
            phase: PhaseTracker::new(pass),
            load_sites: Vec::new(),
        }
    }

    pub fn pass(&self) -> Pass {
        self.strategy.pass()
    }

    pub fn phase(&self) -> PassPhase {
        self.phase.phase()
    }

    pub fn store(&self) -> &SymbolStore {
        &self.store
    }

    /// Walks an entry file of the project pass, unless an earlier entry
    /// already reached it through a load.
    pub fn walk_entry(&mut self, file: FileId) -> Result<(), AnalysisError> {
        if self
            .project
            .as_ref()
            .is_some_and(|project| project.files.contains_key(&file))
        {
            return Ok(());
        }
        let result = self.walk_file(file)?;
        if let Some(project) = self.project.as_mut() {
            project.files.insert(file, result);
        }
        Ok(())
    }

    pub fn finish(mut self) -> WalkOutput<S> {
        self.phase.finish();
        WalkOutput {
            store: self.store,
            strategy: self.strategy,
            project: self.project,
        }
    }

    pub fn walk_file(&mut self, file: FileId) -> Result<FileResult, AnalysisError> {
        let env = self.env;
        let source = env
            .files
            .get(file)
            .ok_or_else(|| AnalysisError::UnknownFile(format!("#{}", file.index())))?;
        let path = source.path.as_str();
        let parsed = &source.parsed;

        let mut sink =
            DiagnosticSink::new(path, env.suppression, Some(parsed.disable_directives()));
        for error in parsed.errors() {
            let range =
                TextRange::from_coords(error.line, error.column, error.line, error.column + 1);
            let diagnostic = Diagnostic::new(ErrorKind::Syntax, error.message.clone(), path, range);
            if self.checks(ErrorKind::Syntax) && self.strategy.on_diagnostic(&diagnostic) {
                sink.report(diagnostic);
            }
        }

        let mut result = FileResult::new(file, path);
        let Some(chunk) = parsed.chunk() else {
            debug!(pass = %self.pass(), path, "no syntax tree, skipping walk");
            result.diagnostics = sink.into_diagnostics();
            return Ok(result);
        };

        debug!(pass = %self.pass(), path, "walking file");
        self.phase.enter(file);

        let main = self.store.create_function(FunctionSpec::main(file, chunk.range));
        let scope = self.store.function(main).main_scope;
        result.main_function = Some(main);

        let mut ctx = FileContext {
            file,
            path,
            function: main,
            scope,
            result,
            sink,
            guards: Vec::new(),
            self_ref: None,
        };
        self.visit_block_body(&mut ctx, &chunk.block);
        self.finish_function(&mut ctx, main);
        self.phase.leave();

        let FileContext {
            mut result, sink, ..
        } = ctx;
        result.return_value = self
            .store
            .function(main)
            .last_value_return()
            .and_then(|site| site.value);
        result.diagnostics = sink.into_diagnostics();

        debug!(
            pass = %self.pass(),
            path,
            diagnostics = result.diagnostics.len(),
            globals = result.globals.len(),
            "finished file"
        );
        Ok(result)
    }

    fn checks(&self, kind: ErrorKind) -> bool {
        self.strategy.should_check(kind, self.env.options.realtime)
    }

    fn report_with(
        &mut self,
        ctx: &mut FileContext<'e>,
        kind: ErrorKind,
        message: String,
        range: TextRange,
        related: Vec<RelatedInfo>,
    ) {
        if !self.checks(kind) {
            return;
        }
        let diagnostic = Diagnostic::new(kind, message, ctx.path, range).with_related(related);
        if self.strategy.on_diagnostic(&diagnostic) {
            ctx.sink.report(diagnostic);
        }
    }

    fn report(
        &mut self,
        ctx: &mut FileContext<'e>,
        kind: ErrorKind,
        message: String,
        range: TextRange,
    ) {
        self.report_with(ctx, kind, message, range, Vec::new());
    }

    fn report_finding(&mut self, ctx: &mut FileContext<'e>, finding: Finding) {
        let related = finding
            .related
            .into_iter()
            .map(|(message, range)| RelatedInfo {
                file: ctx.path.to_string(),
                message,
                range,
            })
            .collect();
        self.report_with(ctx, finding.kind, finding.message, finding.range, related);
    }

    // ----- scopes and functions -----

    fn enter_scope(
        &mut self,
        ctx: &mut FileContext<'e>,
        kind: ScopeKind,
        range: TextRange,
    ) -> ScopeId {
        let outer = ctx.scope;
        ctx.scope = self.store.create_scope(kind, Some(outer), ctx.function, range);
        self.store.function_mut(ctx.function).scope_depth += 1;
        outer
    }

    fn leave_scope(&mut self, ctx: &mut FileContext<'e>, outer: ScopeId) {
        let scope = ctx.scope;
        self.close_scope(ctx, scope);
        let function = self.store.function_mut(ctx.function);
        function.scope_depth = function.scope_depth.saturating_sub(1);
        ctx.scope = outer;
    }

    fn close_scope(&mut self, ctx: &mut FileContext<'e>, scope: ScopeId) {
        if !self.checks(ErrorKind::UnusedLocal) && !self.checks(ErrorKind::UnusedLocalFunction) {
            return;
        }

        let unused: Vec<Finding> = self
            .store
            .scope_locals(scope)
            .map(|id| self.store.variable(id))
            .filter(|var| {
                !var.is_used()
                    && !var
                        .flags
                        .intersects(VariableFlags::PARAMETER | VariableFlags::TO_BE_CLOSED)
                    && !var.name.starts_with('_')
                    && var.alias_of.is_none()
            })
            .map(|var| {
                let (kind, what) = if var.function.is_some() {
                    (ErrorKind::UnusedLocalFunction, "unused local function")
                } else {
                    (ErrorKind::UnusedLocal, "unused local")
                };
                Finding {
                    kind,
                    message: format!("{} '{}'", what, var.name),
                    range: var.range,
                    related: var
                        .assign_sites
                        .iter()
                        .map(|&site| (UNUSED_ASSIGN_NOTE.to_string(), site))
                        .collect(),
                }
            })
            .collect();

        for finding in unused {
            self.report_finding(ctx, finding);
        }
    }

    fn finish_function(&mut self, ctx: &mut FileContext<'e>, function: FunctionId) {
        let gotos = std::mem::take(&mut self.store.function_mut(function).pending_gotos);
        for goto in gotos {
            let visible = self
                .store
                .function(function)
                .labels
                .get(&goto.label)
                .is_some_and(|labels| {
                    labels
                        .iter()
                        .any(|label| self.store.is_descendant_of(goto.scope, label.scope))
                });
            if !visible {
                self.report(
                    ctx,
                    ErrorKind::UnknownGotoLabel,
                    format!("no visible label '{}' for goto", goto.label),
                    goto.range,
                );
            }
        }

        let main_scope = self.store.function(function).main_scope;
        self.close_scope(ctx, main_scope);
    }

    fn create_function(
        &mut self,
        ctx: &FileContext<'e>,
        body: &FunctionBody,
        name: Option<String>,
        has_colon: bool,
        types: Option<FunctionTypes>,
    ) -> FunctionId {
        let id = self.store.create_function(FunctionSpec {
            file: ctx.file,
            name,
            parent: Some(ctx.function),
            parent_scope: Some(ctx.scope),
            params: body.params.iter().map(|p| p.name.clone()).collect(),
            is_vararg: body.is_vararg,
            has_colon,
            range: body.range,
        });
        if let Some(types) = types {
            let function = self.store.function_mut(id);
            function.param_types = types.params;
            function.return_types = types.returns;
        }
        id
    }

    fn walk_function_body(
        &mut self,
        ctx: &mut FileContext<'e>,
        function: FunctionId,
        body: &FunctionBody,
    ) {
        if self.checks(ErrorKind::DuplicateParam) {
            for finding in checks::duplicate_params(&body.params) {
                self.report_finding(ctx, finding);
            }
        }

        let main_scope = self.store.function(function).main_scope;
        let outer_function = std::mem::replace(&mut ctx.function, function);
        let outer_scope = std::mem::replace(&mut ctx.scope, main_scope);
        let outer_guards = std::mem::take(&mut ctx.guards);
        let outer_self_ref = ctx.self_ref.take();

        let (has_colon, colon_variable) = {
            let f = self.store.function(function);
            (f.has_colon, f.colon_variable)
        };
        for (idx, param) in body.params.iter().enumerate() {
            let declared = self
                .store
                .function(function)
                .param_types
                .get(&param.name)
                .cloned();
            let kind = match declared.as_deref() {
                Some(ty) if !ty.ends_with('?') => ValueKind::from_type_name(ty),
                _ => ValueKind::Unknown,
            };
            let mut var = Variable::new(&param.name, ctx.file, param.range)
                .with_kind(kind)
                .with_flags(VariableFlags::PARAMETER);
            var.declared_type = declared;

            let implicit_self = has_colon && idx == 0 && param.name == "self";
            if implicit_self {
                if let Some(owner) = colon_variable {
                    var.kind = ValueKind::Table;
                    var.members = self.store.variable(owner).members.clone();
                }
            }
            self.declare(ctx, var, !implicit_self);
        }

        self.visit_block_body(ctx, &body.block);
        self.finish_function(ctx, function);

        ctx.function = outer_function;
        ctx.scope = outer_scope;
        ctx.guards = outer_guards;
        ctx.self_ref = outer_self_ref;
    }

    fn visit_function(
        &mut self,
        ctx: &mut FileContext<'e>,
        body: &FunctionBody,
        name: Option<String>,
        types: Option<FunctionTypes>,
    ) -> FunctionId {
        let function = self.create_function(ctx, body, name, false, types);
        self.walk_function_body(ctx, function, body);
        function
    }

    // ----- symbols and occurrences -----

    fn declare(
        &mut self,
        ctx: &mut FileContext<'e>,
        mut var: Variable,
        announce: bool,
    ) -> VariableId {
        var.owner = Some(ctx.function);
        let range = var.range;
        let name = var.name.clone();
        let id = self.store.alloc_variable(var);
        self.store.declare_local(ctx.scope, &name, id);
        if announce {
            self.notify(ctx, &name, range, NameRole::Declaration, id);
        }
        id
    }

    fn classify(&self, ctx: &FileContext<'e>, id: VariableId) -> SymbolClass {
        let var = self.store.variable(id);
        if !var.is_local() {
            return if var.function.is_some() || var.kind == ValueKind::Function {
                SymbolClass::GlobalFunction
            } else {
                SymbolClass::Global
            };
        }
        if var.flags.contains(VariableFlags::PARAMETER) {
            SymbolClass::Parameter
        } else if var.flags.contains(VariableFlags::LOOP_VARIABLE) {
            SymbolClass::LoopVariable
        } else if var.owner != Some(ctx.function) {
            SymbolClass::Upvalue
        } else if var.function.is_some() {
            SymbolClass::LocalFunction
        } else {
            SymbolClass::Local
        }
    }

    fn notify(
        &mut self,
        ctx: &FileContext<'e>,
        name: &str,
        range: TextRange,
        role: NameRole,
        id: VariableId,
    ) {
        let var = self.store.variable(id);
        let declaration = DeclKey {
            file: var.file,
            range: var.range,
        };
        let occurrence = NameOccurrence {
            name,
            file: ctx.file,
            range,
            role,
            declaration: Some(declaration),
            class: self.classify(ctx, id),
        };
        self.strategy.on_resolved_name(&occurrence);
    }

    fn notify_unbound(
        &mut self,
        ctx: &FileContext<'e>,
        name: &str,
        range: TextRange,
        class: SymbolClass,
    ) {
        let occurrence = NameOccurrence {
            name,
            file: ctx.file,
            range,
            role: NameRole::Read,
            declaration: None,
            class,
        };
        if class == SymbolClass::Unresolved {
            self.strategy.on_unresolved_name(&occurrence);
        } else {
            self.strategy.on_resolved_name(&occurrence);
        }
    }

    fn info_of(&self, id: VariableId) -> ExpInfo {
        let var = self.store.variable(id);
        ExpInfo {
            kind: var.kind,
            var: Some(id),
            function: var.function,
            reference: var.reference,
        }
    }

    /// A fresh variable carrying `info`'s value.
    fn variable_from(&self, name: &str, file: FileId, range: TextRange, info: ExpInfo) -> Variable {
        let mut var = Variable::new(name, file, range).with_kind(info.kind);
        var.function = info.function;
        var.reference = info.reference;
        if let Some(source) = info.var {
            let source = self.store.variable(source);
            var.members = source.members.clone();
            var.flags |= source.flags & (VariableFlags::DECLARED_EMPTY | VariableFlags::MODULE);
            var.function = var.function.or(source.function);
            var.reference = var.reference.or(source.reference);
            if info.reference.is_some() && info.kind == ValueKind::Table {
                var.flags |= VariableFlags::MODULE;
            }
        }
        var
    }

    /// Updates an existing variable with an assigned value. The kind is only
    /// replaced while it is still nil/unknown or an empty table.
    fn reassign(&mut self, id: VariableId, value: ExpInfo) {
        let source = value.var.filter(|&v| v != id).map(|v| {
            let source = self.store.variable(v);
            (source.members.clone(), source.flags)
        });
        let var = self.store.variable_mut(id);
        if var.kind.is_replaceable() || var.flags.contains(VariableFlags::DECLARED_EMPTY) {
            var.kind = value.kind;
            var.flags.remove(VariableFlags::DECLARED_EMPTY);
            if let Some((members, flags)) = source {
                var.members = members;
                var.flags |= flags & VariableFlags::DECLARED_EMPTY;
            }
        }
        if var.function.is_none() {
            var.function = value.function;
        }
        if value.reference.is_some() {
            var.reference = value.reference;
        }
    }

    fn bind_reference(&mut self, value: ExpInfo, binding: Binding) {
        if let Some(reference) = value.reference {
            self.store.reference_mut(reference).binding = binding;
        }
    }

    fn type_of(&self, info: ExpInfo) -> Option<String> {
        info.var
            .and_then(|v| self.store.variable(v).declared_type.clone())
            .or_else(|| info.kind.type_name().map(str::to_string))
    }

    fn check_assignment_type(
        &mut self,
        ctx: &mut FileContext<'e>,
        name: &str,
        expected: &str,
        value: ExpInfo,
        range: TextRange,
    ) {
        if !self.checks(ErrorKind::AssignmentType) {
            return;
        }
        let Some(actual) = self.type_of(value) else {
            return;
        };
        if !types_compatible(expected, &actual) {
            self.report(
                ctx,
                ErrorKind::AssignmentType,
                format!("cannot assign '{}' to '{}' declared as '{}'", actual, name, expected),
                range,
            );
        }
    }

    // ----- name resolution -----

    /// A global visible from another file for the running pass.
    fn visible_global(&mut self, name: &str) -> Option<VariableId> {
        let env = self.env;
        match self.pass() {
            Pass::FileLocal => None,
            Pass::Project => self.project.as_ref().and_then(|project| project.global(name)),
            Pass::Scattered | Pass::ReferenceSearch | Pass::Coloring => {
                let (analysis, var) = env.first_pass.find_global(name, None)?;
                Some(
                    self.store
                        .import_variable(&analysis.store, analysis.result.file, var),
                )
            }
        }
    }

    fn lookup_name(&mut self, ctx: &FileContext<'e>, name: &str) -> Lookup {
        if let Some(id) = self.store.lookup_local(ctx.scope, name) {
            return Lookup::Found(id);
        }
        if let Some(&id) = ctx.result.globals.get(name) {
            return Lookup::Found(id);
        }

        let env = self.env;
        if let Some(&id) = self
            .project
            .as_ref()
            .and_then(|project| project.root_globals.get(name))
        {
            return Lookup::Found(id);
        }
        if let Some((analysis, var)) = env.first_pass.root_global(name) {
            return Lookup::Found(
                self.store
                    .import_variable(&analysis.store, analysis.result.file, var),
            );
        }
        if let Some(id) = self.visible_global(name) {
            return Lookup::Found(id);
        }
        if is_builtin(name) || env.config.globals.is_ignored(name) {
            return Lookup::Builtin;
        }

        if self.pass() == Pass::Project {
            // The current file, every file still waiting on a load, then
            // files the walk has not reached yet.
            let definition = std::iter::once(ctx.file)
                .chain(self.phase.stack().iter().rev().copied())
                .filter_map(|file| env.first_pass.get(file))
                .find_map(|analysis| analysis.global(name).map(|var| (analysis, var)))
                .or_else(|| env.first_pass.find_global(name, Some(ctx.file)));
            if let Some((analysis, var)) = definition {
                let origin = RelatedInfo {
                    file: analysis.result.path.clone(),
                    message: format!("'{}' is defined here", name),
                    range: analysis.store.variable(var).range,
                };
                let id = self
                    .store
                    .import_variable(&analysis.store, analysis.result.file, var);
                // Function bodies run later, usually after the definition.
                if self.store.function(ctx.function).depth > 0 {
                    return Lookup::Found(id);
                }
                return Lookup::LoadOrder { var: id, origin };
            }
        }

        Lookup::Unresolved
    }

    fn read_name(&mut self, ctx: &mut FileContext<'e>, name: &str, range: TextRange) -> ExpInfo {
        match self.lookup_name(ctx, name) {
            Lookup::Found(id) => {
                self.store.variable_mut(id).flags |= VariableFlags::USED;
                self.notify(ctx, name, range, NameRole::Read, id);
                self.info_of(id)
            }
            Lookup::LoadOrder { var, origin } => {
                if ctx.self_ref.as_deref() != Some(name) {
                    self.report_with(
                        ctx,
                        ErrorKind::LoadOrder,
                        format!("global '{}' is used before its definition has run", name),
                        range,
                        vec![origin],
                    );
                }
                self.notify(ctx, name, range, NameRole::Read, var);
                self.info_of(var)
            }
            Lookup::Builtin => {
                self.notify_unbound(ctx, name, range, SymbolClass::Builtin);
                ExpInfo::of(builtin_kind(name))
            }
            Lookup::Unresolved => {
                self.notify_unbound(ctx, name, range, SymbolClass::Unresolved);
                if ctx.self_ref.as_deref() == Some(name) {
                    return ExpInfo::unknown();
                }
                ctx.result
                    .undefined
                    .entry(name.to_string())
                    .or_default()
                    .push(range);
                self.report(
                    ctx,
                    ErrorKind::UndefinedGlobal,
                    format!("undefined global '{}'", name),
                    range,
                );
                ExpInfo::unknown()
            }
        }
    }

    /// The declaration `name` currently binds to, without importing anything.
    fn current_binding(&self, ctx: &FileContext<'e>, name: &str) -> Option<VariableId> {
        self.store
            .lookup_local(ctx.scope, name)
            .or_else(|| ctx.result.globals.get(name).copied())
            .or_else(|| self.project.as_ref().and_then(|project| project.global(name)))
    }

    fn check_maybe_nil(&mut self, ctx: &mut FileContext<'e>, name: &str, range: TextRange) {
        if !self.checks(ErrorKind::MaybeNil)
            || ctx.guards.iter().any(|guard| guard.contains(name))
        {
            return;
        }
        let Some(narrowed) = self.store.narrowed(ctx.scope, name) else {
            return;
        };
        if self.current_binding(ctx, name) == Some(narrowed) {
            self.report(ctx, ErrorKind::MaybeNil, format!("'{}' may be nil here", name), range);
        }
    }

    // ----- assignment -----

    fn assign_name(
        &mut self,
        ctx: &mut FileContext<'e>,
        name: &str,
        range: TextRange,
        value: ExpInfo,
        statement: TextRange,
    ) {
        if let Some(id) = self.store.lookup_local(ctx.scope, name) {
            self.check_write(ctx, id, name, range, value);
            if !self.store.variable(id).is_used() {
                self.store.variable_mut(id).assign_sites.push(statement);
            }
            self.reassign(id, value);
            self.store.clear_narrowing(ctx.scope, name);
            self.bind_reference(value, Binding::Local);
            self.notify(ctx, name, range, NameRole::Write, id);
            return;
        }

        let existing = match ctx.result.globals.get(name) {
            Some(&id) => Some(id),
            None => self.visible_global(name),
        };
        match existing {
            Some(id) => {
                self.check_write(ctx, id, name, range, value);
                self.reassign(id, value);
                self.store.clear_narrowing(ctx.scope, name);
                ctx.result.globals.entry(name.to_string()).or_insert(id);
                self.notify(ctx, name, range, NameRole::Write, id);
            }
            None => {
                let env = self.env;
                let line = statement.start.line;
                let mut var = self.variable_from(name, ctx.file, range, value);
                var.declared_type = env.oracle.declared_type(ctx.path, line);
                if env.oracle.is_constant(ctx.path, line) {
                    var.flags |= VariableFlags::CONSTANT;
                }
                if let Some(expected) = var.declared_type.clone() {
                    self.check_assignment_type(ctx, name, &expected, value, range);
                }
                let id = self.store.alloc_variable(var);
                ctx.result.globals.insert(name.to_string(), id);
                if let Some(project) = self.project.as_mut() {
                    project.define_global(name, id);
                }
                self.notify(ctx, name, range, NameRole::Declaration, id);
            }
        }
        self.bind_reference(value, Binding::Global);
    }

    fn check_write(
        &mut self,
        ctx: &mut FileContext<'e>,
        id: VariableId,
        name: &str,
        range: TextRange,
        value: ExpInfo,
    ) {
        let (constant, declared) = {
            let var = self.store.variable(id);
            (var.flags.contains(VariableFlags::CONSTANT), var.declared_type.clone())
        };
        if constant {
            self.report(
                ctx,
                ErrorKind::ConstAssign,
                format!("cannot assign to constant variable '{}'", name),
                range,
            );
        }
        if let Some(expected) = declared {
            self.check_assignment_type(ctx, name, &expected, value, range);
        }
    }

    fn define_root_global(
        &mut self,
        ctx: &mut FileContext<'e>,
        name: &str,
        range: TextRange,
        value: ExpInfo,
    ) {
        let env = self.env;
        let existing = match ctx.result.root_globals.get(name) {
            Some(&id) => Some(id),
            None => match self.pass() {
                Pass::FileLocal => None,
                Pass::Project => self
                    .project
                    .as_ref()
                    .and_then(|project| project.root_globals.get(name).copied()),
                _ => env.first_pass.root_global(name).map(|(analysis, var)| {
                    self.store
                        .import_variable(&analysis.store, analysis.result.file, var)
                }),
            },
        };

        let (id, role) = match existing {
            Some(id) => {
                self.reassign(id, value);
                (id, NameRole::Write)
            }
            None => {
                let var = self
                    .variable_from(name, ctx.file, range, value)
                    .with_flags(VariableFlags::ROOT_NAMESPACE);
                let id = self.store.alloc_variable(var);
                if let Some(project) = self.project.as_mut() {
                    project.define_root_global(name, id);
                }
                (id, NameRole::Declaration)
            }
        };
        ctx.result.root_globals.entry(name.to_string()).or_insert(id);
        ctx.result.globals.entry(name.to_string()).or_insert(id);
        self.bind_reference(value, Binding::Global);
        self.notify(ctx, name, range, role, id);
    }

    fn set_member(
        &mut self,
        ctx: &FileContext<'e>,
        owner: VariableId,
        key: &str,
        range: TextRange,
        value: ExpInfo,
    ) {
        if let Some(existing) = self.store.member(owner, key) {
            self.reassign(existing, value);
            return;
        }
        let var = self.variable_from(key, ctx.file, range, value);
        let id = self.store.alloc_variable(var);
        let owner = self.store.variable_mut(owner);
        owner.members.insert(key.to_string(), id);
        owner.flags.remove(VariableFlags::DECLARED_EMPTY);
    }

    /// `a.b = v` and `a.b.c = v`; `_G.x = v` defines a root global.
    fn assign_member(
        &mut self,
        ctx: &mut FileContext<'e>,
        chain: &[(String, TextRange)],
        value: ExpInfo,
    ) {
        let Some(((key, key_range), prefix)) = chain.split_last() else {
            return;
        };
        let Some(((base, base_range), path)) = prefix.split_first() else {
            return;
        };

        if base == "_G" && path.is_empty() {
            self.read_name(ctx, base, *base_range);
            self.define_root_global(ctx, key, *key_range, value);
            return;
        }

        let base_info = self.read_name(ctx, base, *base_range);
        self.check_maybe_nil(ctx, base, *base_range);
        let mut owner = base_info.var;
        for (segment, _) in path {
            owner = owner.and_then(|id| self.store.member(id, segment));
        }
        if let Some(owner) = owner {
            self.set_member(ctx, owner, key, *key_range, value);
        }
    }

    fn assign_target(
        &mut self,
        ctx: &mut FileContext<'e>,
        target: &Exp,
        value: ExpInfo,
        statement: TextRange,
    ) {
        match &target.kind {
            ExpKind::Name(name) => self.assign_name(ctx, name, target.range, value, statement),
            ExpKind::Index { obj, key, .. } => match checks::member_chain(target) {
                Some(chain) if chain.len() <= MAX_MEMBER_CHAIN => {
                    self.assign_member(ctx, &chain, value)
                }
                _ => {
                    self.visit_indexed(ctx, obj);
                    self.visit_exp(ctx, key);
                }
            },
            _ => {
                self.visit_exp(ctx, target);
            }
        }
    }

    // ----- statements -----

    fn visit_block(&mut self, ctx: &mut FileContext<'e>, block: &Block, kind: ScopeKind) {
        let outer = self.enter_scope(ctx, kind, block.range);
        self.visit_block_body(ctx, block);
        self.leave_scope(ctx, outer);
    }

    fn visit_block_body(&mut self, ctx: &mut FileContext<'e>, block: &Block) {
        for stat in &block.stats {
            self.visit_stat(ctx, stat);
        }
        if let Some(ret) = &block.ret {
            self.visit_return(ctx, ret);
        }
    }

    fn visit_stat(&mut self, ctx: &mut FileContext<'e>, stat: &Stat) {
        match &stat.kind {
            StatKind::Empty | StatKind::Break => {}
            StatKind::Local(local) => self.visit_local(ctx, local, stat.range),
            StatKind::LocalFunction { name, body } => {
                self.visit_local_function(ctx, name, body, stat.range)
            }
            StatKind::Function { name, body } => {
                self.visit_function_stat(ctx, name, body, stat.range)
            }
            StatKind::Assign { targets, exprs } => {
                self.visit_assign(ctx, targets, exprs, stat.range)
            }
            StatKind::Call(exp) => {
                self.visit_exp(ctx, exp);
            }
            StatKind::Do(block) => self.visit_block(ctx, block, ScopeKind::Block),
            StatKind::While { cond, block } => {
                self.visit_exp(ctx, cond);
                self.visit_block(ctx, block, ScopeKind::Loop);
            }
            StatKind::Repeat { block, cond } => {
                // The condition sees the body's locals.
                let outer = self.enter_scope(ctx, ScopeKind::Loop, block.range.cover(cond.range));
                self.visit_block_body(ctx, block);
                self.visit_exp(ctx, cond);
                self.leave_scope(ctx, outer);
            }
            StatKind::If(stat) => self.visit_if(ctx, stat),
            StatKind::NumericFor {
                var,
                start,
                limit,
                step,
                block,
            } => {
                self.visit_exp(ctx, start);
                self.visit_exp(ctx, limit);
                if let Some(step) = step {
                    self.visit_exp(ctx, step);
                }
                let outer = self.enter_scope(ctx, ScopeKind::Loop, block.range);
                self.declare_loop_variable(ctx, var, ValueKind::Number);
                self.visit_block_body(ctx, block);
                self.leave_scope(ctx, outer);
            }
            StatKind::GenericFor {
                names,
                exprs,
                block,
            } => {
                for exp in exprs {
                    self.visit_exp(ctx, exp);
                }
                let outer = self.enter_scope(ctx, ScopeKind::Loop, block.range);
                for name in names {
                    self.declare_loop_variable(ctx, name, ValueKind::Unknown);
                }
                self.visit_block_body(ctx, block);
                self.leave_scope(ctx, outer);
            }
            StatKind::Goto(label) => {
                let goto = PendingGoto {
                    label: label.name.clone(),
                    scope: ctx.scope,
                    range: label.range,
                };
                self.store.function_mut(ctx.function).pending_gotos.push(goto);
            }
            StatKind::Label(label) => {
                let scope = ctx.scope;
                self.store
                    .function_mut(ctx.function)
                    .labels
                    .entry(label.name.clone())
                    .or_default()
                    .push(Label {
                        scope,
                        range: label.range,
                    });
            }
        }
    }

    fn declare_loop_variable(&mut self, ctx: &mut FileContext<'e>, name: &Name, kind: ValueKind) {
        let var = Variable::new(&name.name, ctx.file, name.range)
            .with_kind(kind)
            .with_flags(VariableFlags::LOOP_VARIABLE);
        self.declare(ctx, var, true);
    }

    /// Walks the right-hand side of an assignment, with `self_ref` set for
    /// the `x = x or default` idiom.
    fn visit_values(
        &mut self,
        ctx: &mut FileContext<'e>,
        exprs: &[Exp],
        self_ref: Option<String>,
    ) -> Vec<ExpInfo> {
        let outer = std::mem::replace(&mut ctx.self_ref, self_ref);
        let infos = exprs.iter().map(|exp| self.visit_exp(ctx, exp)).collect();
        ctx.self_ref = outer;
        infos
    }

    fn visit_local(&mut self, ctx: &mut FileContext<'e>, local: &LocalStat, range: TextRange) {
        let self_ref = match (local.names.as_slice(), local.exprs.as_slice()) {
            ([target], [value]) if checks::is_self_reference_idiom(&target.name.name, value) => {
                Some(target.name.name.clone())
            }
            _ => None,
        };
        let infos = self.visit_values(ctx, &local.exprs, self_ref);

        if self.checks(ErrorKind::AssignCount) {
            if let Some(finding) =
                checks::value_count_mismatch(local.names.len(), &local.exprs, range)
            {
                self.report_finding(ctx, finding);
            }
        }

        let env = self.env;
        let line = range.start.line;
        let declared = env.oracle.declared_type(ctx.path, line);
        let constant = env.oracle.is_constant(ctx.path, line);

        for (idx, local_name) in local.names.iter().enumerate() {
            let name = &local_name.name;
            let value = value_at(&infos, &local.exprs, idx);
            let mut var = self.variable_from(
                &name.name,
                ctx.file,
                name.range,
                value.unwrap_or(ExpInfo::of(ValueKind::Nil)),
            );
            match local_name.attrib {
                Some(Attrib::Const) => var.flags |= VariableFlags::CONSTANT,
                Some(Attrib::Close) => {
                    var.flags |= VariableFlags::CONSTANT | VariableFlags::TO_BE_CLOSED
                }
                None => {}
            }
            if idx == 0 {
                if constant {
                    var.flags |= VariableFlags::CONSTANT;
                }
                var.declared_type = declared.clone();
            }
            var.alias_of = local
                .exprs
                .get(idx)
                .and_then(Exp::as_name)
                .filter(|alias| {
                    is_builtin(alias) && self.store.lookup_local(ctx.scope, alias).is_none()
                })
                .map(str::to_string);

            if let (Some(expected), Some(value)) = (var.declared_type.clone(), value) {
                self.check_assignment_type(ctx, &name.name, &expected, value, name.range);
            }

            let reference = var.reference;
            self.declare(ctx, var, true);
            if let Some(reference) = reference {
                self.store.reference_mut(reference).binding = Binding::Local;
            }
        }
    }

    fn visit_local_function(
        &mut self,
        ctx: &mut FileContext<'e>,
        name: &Name,
        body: &FunctionBody,
        range: TextRange,
    ) {
        let types = self.env.oracle.function_types(ctx.path, range.start.line);
        let function = self.create_function(ctx, body, Some(name.name.clone()), false, types);
        let mut var =
            Variable::new(&name.name, ctx.file, name.range).with_kind(ValueKind::Function);
        var.function = Some(function);
        // Declared before the body so the function can call itself.
        self.declare(ctx, var, true);
        self.walk_function_body(ctx, function, body);
    }

    fn visit_function_stat(
        &mut self,
        ctx: &mut FileContext<'e>,
        name: &FuncName,
        body: &FunctionBody,
        range: TextRange,
    ) {
        let types = self.env.oracle.function_types(ctx.path, range.start.line);
        let mut segments: Vec<&Name> = name.path.iter().collect();
        let mut display = segments
            .iter()
            .map(|segment| segment.name.as_str())
            .collect::<Vec<_>>()
            .join(".");
        if let Some(method) = &name.method {
            display = format!("{}:{}", display, method.name);
            segments.push(method);
        }
        let has_colon = name.method.is_some();
        let function = self.create_function(ctx, body, Some(display), has_colon, types);
        let value = ExpInfo {
            function: Some(function),
            ..ExpInfo::of(ValueKind::Function)
        };

        match segments.as_slice() {
            [] => {}
            [single] => self.assign_name(ctx, &single.name, single.range, value, range),
            [base, key] if base.name == "_G" => {
                self.read_name(ctx, &base.name, base.range);
                self.define_root_global(ctx, &key.name, key.range, value);
            }
            [base, rest @ ..] => {
                let base_info = self.read_name(ctx, &base.name, base.range);
                self.check_maybe_nil(ctx, &base.name, base.range);
                if let Some((key, path)) = rest.split_last() {
                    if segments.len() <= MAX_MEMBER_CHAIN {
                        let mut owner = base_info.var;
                        for segment in path {
                            owner = owner.and_then(|id| self.store.member(id, &segment.name));
                        }
                        if let Some(owner) = owner {
                            if has_colon {
                                self.store.function_mut(function).colon_variable = Some(owner);
                            }
                            self.set_member(ctx, owner, &key.name, key.range, value);
                        }
                    }
                }
            }
        }

        self.walk_function_body(ctx, function, body);
    }

    fn visit_assign(
        &mut self,
        ctx: &mut FileContext<'e>,
        targets: &[Exp],
        exprs: &[Exp],
        range: TextRange,
    ) {
        let self_ref = match (targets, exprs) {
            ([target], [value]) => target
                .as_name()
                .filter(|name| checks::is_self_reference_idiom(name, value))
                .map(str::to_string),
            _ => None,
        };
        let infos = self.visit_values(ctx, exprs, self_ref);

        if self.checks(ErrorKind::AssignCount) {
            if let Some(finding) = checks::value_count_mismatch(targets.len(), exprs, range) {
                self.report_finding(ctx, finding);
            }
        }
        if self.checks(ErrorKind::SelfAssign) {
            for finding in checks::self_assignments(targets, exprs) {
                self.report_finding(ctx, finding);
            }
        }

        for (idx, target) in targets.iter().enumerate() {
            let value = value_at(&infos, exprs, idx).unwrap_or(ExpInfo::of(ValueKind::Nil));
            self.assign_target(ctx, target, value, range);
        }
    }

    fn visit_if(&mut self, ctx: &mut FileContext<'e>, stat: &IfStat) {
        if self.checks(ErrorKind::DuplicateIf) {
            for finding in checks::duplicate_conditions(&stat.clauses) {
                self.report_finding(ctx, finding);
            }
        }

        let scope = ctx.scope;
        let outer_mid = std::mem::take(&mut self.store.scope_mut(scope).mid_narrow);

        for clause in &stat.clauses {
            self.visit_exp(ctx, &clause.cond);

            let outer = self.enter_scope(ctx, ScopeKind::Branch, clause.block.range);
            self.apply_narrowing(ctx, scope, &falsy_when(&clause.cond, true));
            self.visit_block_body(ctx, &clause.block);
            self.leave_scope(ctx, outer);

            // Later branches run only when this condition failed.
            for name in falsy_when(&clause.cond, false) {
                if let Some(var) = self.current_binding(ctx, &name) {
                    self.store.scope_mut(scope).mid_narrow.insert(name, var);
                }
            }
        }

        if let Some(block) = &stat.else_block {
            let outer = self.enter_scope(ctx, ScopeKind::Branch, block.range);
            self.apply_narrowing(ctx, scope, &NameSet::new());
            self.visit_block_body(ctx, block);
            self.leave_scope(ctx, outer);
        }

        self.store.scope_mut(scope).mid_narrow = outer_mid;
    }

    /// Narrows the current branch scope with what earlier conditions of the
    /// chain proved plus `proven`.
    fn apply_narrowing(&mut self, ctx: &FileContext<'e>, chain_scope: ScopeId, proven: &NameSet) {
        let earlier: Vec<(String, VariableId)> = self
            .store
            .scope(chain_scope)
            .mid_narrow
            .iter()
            .map(|(name, &var)| (name.clone(), var))
            .collect();
        for (name, var) in earlier {
            if self.current_binding(ctx, &name) == Some(var) {
                self.store.narrow(ctx.scope, &name, var);
            }
        }
        for name in proven {
            if let Some(var) = self.current_binding(ctx, name) {
                self.store.narrow(ctx.scope, name, var);
            }
        }
    }

    fn visit_return(&mut self, ctx: &mut FileContext<'e>, ret: &ReturnStat) {
        let infos: Vec<ExpInfo> = ret.exprs.iter().map(|exp| self.visit_exp(ctx, exp)).collect();

        let return_types = self.store.function(ctx.function).return_types.clone();
        if !return_types.is_empty() && self.checks(ErrorKind::ReturnType) {
            for (idx, (exp, info)) in ret.exprs.iter().zip(&infos).enumerate() {
                let Some(expected) = return_types.get(idx) else {
                    break;
                };
                let Some(actual) = self.type_of(*info) else {
                    continue;
                };
                if !types_compatible(expected, &actual) {
                    self.report(
                        ctx,
                        ErrorKind::ReturnType,
                        format!(
                            "return value #{} has type '{}' but '{}' is declared",
                            idx + 1,
                            actual,
                            expected
                        ),
                        exp.range,
                    );
                }
            }
        }

        let (kind, value) = match (infos.first(), ret.exprs.first()) {
            (Some(&info), Some(exp)) => {
                let value = match info.var {
                    Some(var) => var,
                    None => {
                        let var = self.variable_from("", ctx.file, exp.range, info);
                        self.store.alloc_variable(var)
                    }
                };
                (info.kind, Some(value))
            }
            _ => (ValueKind::Nil, None),
        };
        self.store.function_mut(ctx.function).returns.push(ReturnSite {
            range: ret.range,
            kind,
            value,
        });
    }

    // ----- expressions -----

    fn visit_exp(&mut self, ctx: &mut FileContext<'e>, exp: &Exp) -> ExpInfo {
        match &exp.kind {
            ExpKind::Nil => ExpInfo::of(ValueKind::Nil),
            ExpKind::True | ExpKind::False => ExpInfo::of(ValueKind::Boolean),
            ExpKind::Vararg => ExpInfo::unknown(),
            ExpKind::Number { .. } => ExpInfo::of(ValueKind::Number),
            ExpKind::String(_) => ExpInfo::of(ValueKind::String),
            ExpKind::Function(body) => {
                let types = self.env.oracle.function_types(ctx.path, body.range.start.line);
                let function = self.visit_function(ctx, body, None, types);
                ExpInfo {
                    function: Some(function),
                    ..ExpInfo::of(ValueKind::Function)
                }
            }
            ExpKind::Table(table) => self.visit_table(ctx, table, exp.range),
            ExpKind::Name(name) => self.read_name(ctx, name, exp.range),
            ExpKind::Index { obj, key, .. } => {
                let owner = self.visit_indexed(ctx, obj);
                match key.as_string() {
                    Some(member) => self.member_info(ctx, owner, member, key.range),
                    None => {
                        self.visit_exp(ctx, key);
                        ExpInfo::unknown()
                    }
                }
            }
            ExpKind::Call { func, args } => self.visit_call(ctx, func, args, exp.range),
            ExpKind::MethodCall { obj, method, args } => {
                self.visit_method_call(ctx, obj, method, args, exp.range)
            }
            ExpKind::Binary { op, lhs, rhs } => self.visit_binary(ctx, *op, lhs, rhs, exp.range),
            ExpKind::Unary { op, operand } => {
                self.visit_exp(ctx, operand);
                match op {
                    UnOp::Not => ExpInfo::of(ValueKind::Boolean),
                    UnOp::Neg | UnOp::Len | UnOp::BNot => ExpInfo::of(ValueKind::Number),
                }
            }
            // Parentheses truncate to one value; the value itself is kept.
            ExpKind::Paren(inner) => self.visit_exp(ctx, inner),
        }
    }

    /// The object of an index or method call; indexing a name proven nil is
    /// reported here.
    fn visit_indexed(&mut self, ctx: &mut FileContext<'e>, obj: &Exp) -> ExpInfo {
        let info = self.visit_exp(ctx, obj);
        if let Some(name) = obj.unparen().as_name() {
            self.check_maybe_nil(ctx, name, obj.range);
        }
        info
    }

    fn is_resolved_module(&self, id: VariableId) -> bool {
        let var = self.store.variable(id);
        var.flags.contains(VariableFlags::MODULE)
            && var.reference.is_none_or(|reference| {
                let reference = self.store.reference(reference);
                reference.target.is_some() && !reference.in_progress
            })
    }

    fn member_info(
        &mut self,
        ctx: &mut FileContext<'e>,
        owner: ExpInfo,
        key: &str,
        range: TextRange,
    ) -> ExpInfo {
        let Some(owner) = owner.var else {
            return ExpInfo::unknown();
        };
        if let Some(member) = self.store.member(owner, key) {
            return self.info_of(member);
        }
        if self.checks(ErrorKind::UndefinedMember) && self.is_resolved_module(owner) {
            let module = self.store.variable(owner).name.clone();
            self.report(
                ctx,
                ErrorKind::UndefinedMember,
                format!("module '{}' has no member '{}'", module, key),
                range,
            );
        }
        ExpInfo::unknown()
    }

    fn visit_table(
        &mut self,
        ctx: &mut FileContext<'e>,
        table: &TableConstructor,
        range: TextRange,
    ) -> ExpInfo {
        if self.checks(ErrorKind::DuplicateKey) {
            for finding in checks::duplicate_keys(table) {
                self.report_finding(ctx, finding);
            }
        }
        if self.checks(ErrorKind::DuplicateEnumValue)
            && self.env.oracle.is_enum(ctx.path, range.start.line)
        {
            for finding in checks::duplicate_enum_values(table) {
                self.report_finding(ctx, finding);
            }
        }

        let mut members = IndexMap::new();
        for field in &table.fields {
            match field {
                Field::Named { key, value } => {
                    let info = self.visit_exp(ctx, value);
                    let var = self.variable_from(&key.name, ctx.file, key.range, info);
                    members.insert(key.name.clone(), self.store.alloc_variable(var));
                }
                Field::Keyed { key, value } => {
                    self.visit_exp(ctx, key);
                    let info = self.visit_exp(ctx, value);
                    if let Some(name) = key.as_string() {
                        let var = self.variable_from(name, ctx.file, key.range, info);
                        members.insert(name.to_string(), self.store.alloc_variable(var));
                    }
                }
                Field::Positional(value) => {
                    self.visit_exp(ctx, value);
                }
            }
        }

        let mut var = Variable::new("", ctx.file, range).with_kind(ValueKind::Table);
        if table.fields.is_empty() {
            var.flags |= VariableFlags::DECLARED_EMPTY;
        }
        var.members = members;
        ExpInfo {
            var: Some(self.store.alloc_variable(var)),
            ..ExpInfo::of(ValueKind::Table)
        }
    }

    fn visit_binary(
        &mut self,
        ctx: &mut FileContext<'e>,
        op: BinOp,
        lhs: &Exp,
        rhs: &Exp,
        range: TextRange,
    ) -> ExpInfo {
        for finding in checks::redundant_binary(op, lhs, rhs, range) {
            self.report_finding(ctx, finding);
        }

        let left = self.visit_exp(ctx, lhs);
        let guard = match op {
            BinOp::And => Some(truthy_when(lhs, true)),
            BinOp::Or => Some(truthy_when(lhs, false)),
            _ => None,
        };
        let right = match guard {
            Some(guard) => {
                ctx.guards.push(guard);
                let right = self.visit_exp(ctx, rhs);
                ctx.guards.pop();
                right
            }
            None => self.visit_exp(ctx, rhs),
        };

        self.check_operands(ctx, op, &[(lhs, left), (rhs, right)]);

        match op {
            BinOp::And => right,
            BinOp::Or if left.kind.is_replaceable() => right,
            BinOp::Or if left.kind == right.kind => left,
            BinOp::Or => ExpInfo::unknown(),
            BinOp::Concat => ExpInfo::of(ValueKind::String),
            _ if op.is_comparison() => ExpInfo::of(ValueKind::Boolean),
            _ => ExpInfo::of(ValueKind::Number),
        }
    }

    fn check_operands(
        &mut self,
        ctx: &mut FileContext<'e>,
        op: BinOp,
        operands: &[(&Exp, ExpInfo)],
    ) {
        let expected = if op.is_arithmetic() {
            "number"
        } else if op == BinOp::Concat {
            "string|number"
        } else {
            return;
        };
        if !self.checks(ErrorKind::BinaryOperandType) {
            return;
        }

        for &(exp, info) in operands {
            let declared = info.var.and_then(|v| self.store.variable(v).declared_type.clone());
            let actual = match declared {
                // Class types may carry metamethods.
                Some(ty)
                    if !ty.ends_with('?')
                        && matches!(
                            ValueKind::from_type_name(&ty),
                            ValueKind::Nil
                                | ValueKind::Boolean
                                | ValueKind::String
                                | ValueKind::Function
                        ) =>
                {
                    ty
                }
                Some(_) => continue,
                None => match info.kind {
                    ValueKind::Nil | ValueKind::Boolean | ValueKind::Function => {
                        info.kind.type_name().unwrap_or_default().to_string()
                    }
                    _ => continue,
                },
            };
            if !types_compatible(expected, &actual) {
                self.report(
                    ctx,
                    ErrorKind::BinaryOperandType,
                    format!(
                        "operand of '{}' has type '{}' but '{}' is expected",
                        op.as_str(),
                        actual,
                        expected
                    ),
                    exp.range,
                );
            }
        }
    }

    fn visit_call(
        &mut self,
        ctx: &mut FileContext<'e>,
        func: &Exp,
        args: &[Exp],
        range: TextRange,
    ) -> ExpInfo {
        if let Some(info) = self.try_visit_load(ctx, func, args, range) {
            return info;
        }

        let callee = self.visit_exp(ctx, func);
        let arg_infos: Vec<ExpInfo> = args.iter().map(|arg| self.visit_exp(ctx, arg)).collect();
        let name = checks::member_chain(func)
            .map(|chain| {
                chain
                    .iter()
                    .map(|(segment, _)| segment.as_str())
                    .collect::<Vec<_>>()
                    .join(".")
            })
            .unwrap_or_else(|| "function".to_string());
        self.check_call(ctx, callee, &name, args, &arg_infos, false, range);
        self.call_result(callee)
    }

    fn visit_method_call(
        &mut self,
        ctx: &mut FileContext<'e>,
        obj: &Exp,
        method: &Name,
        args: &[Exp],
        range: TextRange,
    ) -> ExpInfo {
        let owner = self.visit_indexed(ctx, obj);
        let callee = self.member_info(ctx, owner, &method.name, method.range);
        let arg_infos: Vec<ExpInfo> = args.iter().map(|arg| self.visit_exp(ctx, arg)).collect();
        self.check_call(ctx, callee, &method.name, args, &arg_infos, true, range);
        self.call_result(callee)
    }

    fn callee_function(&self, callee: ExpInfo) -> Option<FunctionId> {
        callee
            .function
            .or_else(|| callee.var.and_then(|v| self.store.variable(v).function))
    }

    #[allow(clippy::too_many_arguments)]
    fn check_call(
        &mut self,
        ctx: &mut FileContext<'e>,
        callee: ExpInfo,
        name: &str,
        args: &[Exp],
        arg_infos: &[ExpInfo],
        method_call: bool,
        range: TextRange,
    ) {
        let Some(function) = self.callee_function(callee) else {
            return;
        };
        let (params, is_vararg, param_types) = {
            let f = self.store.function(function);
            (f.params.clone(), f.is_vararg, f.param_types.clone())
        };
        // `obj:m(a)` passes `obj` as the first parameter.
        let offset = usize::from(method_call);

        if !is_vararg && self.checks(ErrorKind::CallArity) {
            let mut given = args.len();
            if args.last().is_some_and(Exp::is_multi_value) {
                given -= 1;
            }
            if given + offset > params.len() {
                self.report(
                    ctx,
                    ErrorKind::CallArity,
                    format!(
                        "'{}' takes {} argument(s) but {} were given",
                        name,
                        params.len().saturating_sub(offset),
                        given
                    ),
                    range,
                );
            }
        }

        if param_types.is_empty() || !self.checks(ErrorKind::ArgumentType) {
            return;
        }
        for (idx, (arg, &info)) in args.iter().zip(arg_infos).enumerate() {
            let Some(param) = params.get(idx + offset) else {
                break;
            };
            let Some(expected) = param_types.get(param) else {
                continue;
            };
            let Some(actual) = self.type_of(info) else {
                continue;
            };
            if !types_compatible(expected, &actual) {
                self.report(
                    ctx,
                    ErrorKind::ArgumentType,
                    format!(
                        "argument #{} of '{}' expects '{}' but got '{}'",
                        idx + 1,
                        name,
                        expected,
                        actual
                    ),
                    arg.range,
                );
            }
        }
    }

    fn call_result(&self, callee: ExpInfo) -> ExpInfo {
        let Some(function) = self.callee_function(callee) else {
            return ExpInfo::unknown();
        };
        let function = self.store.function(function);
        let kind = match function.return_types.first() {
            Some(ty) if !ty.ends_with('?') => ValueKind::from_type_name(ty),
            Some(_) => ValueKind::Unknown,
            None => function
                .last_value_return()
                .map_or(ValueKind::Unknown, |site| site.kind),
        };
        ExpInfo::of(kind)
    }

    // ----- loads -----

    /// `require "m"`, `dofile "f.lua"`, `loadfile "f.lua"` and configured
    /// primitives called with a literal argument.
    fn try_visit_load(
        &mut self,
        ctx: &mut FileContext<'e>,
        func: &Exp,
        args: &[Exp],
        range: TextRange,
    ) -> Option<ExpInfo> {
        let env = self.env;
        let name = func.as_name()?;
        let load = resolver::load_kind_for(name, &env.config.imports)?;
        if self.store.lookup_local(ctx.scope, name).is_some() {
            return None;
        }
        let module = args.first()?.unparen().as_string()?;

        if is_builtin(name) {
            self.read_name(ctx, name, func.range);
        } else {
            self.notify_unbound(ctx, name, func.range, SymbolClass::Builtin);
        }
        for arg in args {
            self.visit_exp(ctx, arg);
        }
        Some(self.visit_load(ctx, load, module, range))
    }

    fn visit_load(
        &mut self,
        ctx: &mut FileContext<'e>,
        load: LoadKind,
        module: &str,
        range: TextRange,
    ) -> ExpInfo {
        let env = self.env;
        let target = resolver::resolve_module(env.files, &env.config.imports, module, load);
        let reference = self.store.alloc_reference(Reference {
            path: module.to_string(),
            load,
            target,
            binding: Binding::Unbound,
            range,
            in_progress: false,
        });
        ctx.result.references.push(reference);

        let fallback = if load == LoadKind::Loadfile {
            ValueKind::Function
        } else {
            ValueKind::Unknown
        };
        let Some(target) = target else {
            if !resolver::is_external_module(module, &env.config.imports) {
                if self.strategy.recurses_into_imports() {
                    warn!(module, file = ctx.path, "load target not found");
                } else {
                    debug!(module, file = ctx.path, "load target not found");
                }
                self.report(
                    ctx,
                    ErrorKind::ImportNotFound,
                    format!("cannot find module '{}'", module),
                    range,
                );
            }
            return ExpInfo {
                reference: Some(reference),
                ..ExpInfo::of(fallback)
            };
        };

        let value = self.module_value(ctx, reference, target, load);
        if self.store.reference(reference).in_progress {
            self.report_load_cycle(ctx, module, target, range);
        }
        let (kind, function) = match value {
            Some(var) => {
                let var = self.store.variable(var);
                (var.kind, var.function)
            }
            None => (fallback, None),
        };
        ExpInfo {
            kind,
            var: value,
            function,
            reference: Some(reference),
        }
    }

    /// A load of a file that is still running further down the walk stack.
    fn report_load_cycle(
        &mut self,
        ctx: &mut FileContext<'e>,
        module: &str,
        target: FileId,
        range: TextRange,
    ) {
        let env = self.env;
        let related: Vec<RelatedInfo> = self
            .load_sites
            .iter()
            .find(|(file, _)| *file == target)
            .map(|&(file, site)| RelatedInfo {
                file: env.files.path(file).to_string(),
                message: format!("'{}' is suspended on this load", env.files.path(file)),
                range: site,
            })
            .into_iter()
            .collect();
        self.report_with(
            ctx,
            ErrorKind::LoadOrder,
            format!("circular load: module '{}' has not finished running", module),
            range,
            related,
        );
    }

    /// The value a load of `target` evaluates to, memoized per target and
    /// load kind. The project pass walks targets it has not seen yet.
    fn module_value(
        &mut self,
        ctx: &FileContext<'e>,
        reference: ReferenceId,
        target: FileId,
        load: LoadKind,
    ) -> Option<VariableId> {
        if let Some(value) = self.memo.get(target, load) {
            return value;
        }

        let env = self.env;
        let value = match self.pass() {
            Pass::FileLocal => None,
            Pass::Project => {
                if self.phase.is_active(target) {
                    self.store.reference_mut(reference).in_progress = true;
                    trace!(file = ctx.path, target = env.files.path(target), "load cycle");
                    return None;
                }
                let walked = self
                    .project
                    .as_ref()
                    .is_some_and(|project| project.files.contains_key(&target));
                if !walked {
                    self.load_sites
                        .push((ctx.file, self.store.reference(reference).range));
                    let nested = self.walk_file(target);
                    self.load_sites.pop();
                    match nested {
                        Ok(nested) => {
                            if let Some(project) = self.project.as_mut() {
                                project.files.insert(target, nested);
                            }
                        }
                        Err(err) => {
                            warn!(%err, file = ctx.path, "could not walk load target");
                            return None;
                        }
                    }
                }
                match self.project.as_ref().and_then(|project| project.files.get(&target)) {
                    Some(result) => resolver::bind_module(&mut self.store, load, result),
                    None => None,
                }
            }
            Pass::Scattered | Pass::ReferenceSearch | Pass::Coloring => env
                .first_pass
                .get(target)
                .and_then(|analysis| resolver::import_module(&mut self.store, load, analysis)),
        };

        self.memo.insert(target, load, value);
        value
    }
}

/// The value assigned to the `idx`-th target: explicit, from a trailing
/// multi-value expression, or missing.
fn value_at(infos: &[ExpInfo], exprs: &[Exp], idx: usize) -> Option<ExpInfo> {
    if let Some(&info) = infos.get(idx) {
        return Some(info);
    }
    exprs
        .last()
        .filter(|exp| exp.is_multi_value())
        .map(|_| ExpInfo::unknown())
}

fn builtin_kind(name: &str) -> ValueKind {
    match name {
        "_VERSION" => ValueKind::String,
        "_G" | "_ENV" => ValueKind::Table,
        name if is_builtin_module(name) => ValueKind::Table,
        _ => ValueKind::Function,
    }
}
