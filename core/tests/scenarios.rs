//! End-to-end tests driving a handful of full generator lowerings through a tiny interpreter
//! playing the role of the runtime `context` object (§8 of the design this repository follows).
//!
//! `StepMachine` owns the lowered `Arena` and walks the generated
//! `function(context) { do { switch (context.nextAddress) { ... } } while (0); }` the same way a
//! real JS engine would: one call to `run_one_pass` is one invocation of that function, executing
//! cases in array order with ordinary `switch` fallthrough until a `break` (ends this invocation),
//! a `return` (ditto — always via a `context.<method>(...)` call whose side effects are what
//! actually matter), or the statement list runs out. `drive` is the trampoline a real runtime
//! keeps around `program(context)`: a bare `jumpTo` never pauses or finishes the generator, so it
//! just calls `program` again immediately; only `yield`/`yieldAll` (pause) or `return`/running off
//! the end (finish) stop it.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::cell::RefCell;

use jscomp_genlower::runtime::context_name;
use jscomp_genlower::{DefaultExpressionDecomposer, EmitOptions, GeneratorLoweringPass, SimpleCfgOracle, ENTRY_ID, PROGRAM_END_ID};
use jscomp_genlower_ast::{block_of, Arena, Literal, NodeId, NodeKind};
use jscomp_genlower_diagnostics::DiagnosticsHandler;
use pretty_assertions::assert_eq;

// ---- values & control signals ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Number(i64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
    /// Models JS object key-enumeration order for `for-in` (§4.4.i); shared via `Rc` so the
    /// iterator variable `context.forIn(obj)` hands back and the original free variable alias the
    /// same underlying queue.
    Keys(Rc<RefCell<VecDeque<String>>>),
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Number(n) => *n != 0,
        Value::Str(s) => !s.is_empty(),
        Value::Bool(b) => *b,
        Value::Null | Value::Undefined => false,
        Value::Keys(q) => !q.borrow().is_empty(),
    }
}

fn literal_to_value(lit: &Literal) -> Value {
    match lit {
        Literal::Number(n) => Value::Number(*n),
        Literal::Str(s) => Value::Str(s.to_string()),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
        Literal::Undefined => Value::Undefined,
    }
}

/// What one executed statement did, mirroring ordinary JS statement completion values closely
/// enough to drive a switch: `Continue` falls through to the next statement (or, at the top of a
/// case, into whatever case follows it), `Break` is a literal `break;`, `Stop` is a `return`/`throw`
/// that must unwind out of every enclosing construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Continue,
    Break,
    Stop,
}

// ---- the interpreter ----------------------------------------------------------------------------

struct StepMachine {
    arena: Arena,
    /// `(case id, case body block)` in the generated switch's array order — fallthrough between
    /// adjacent entries is exactly why this is a `Vec`, not a `HashMap`.
    switch_cases: Vec<(i64, NodeId)>,
    context_var: String,
    vars: HashMap<String, Value>,
    next_address: i64,
    /// What `context.yieldResult` reads back as, set by `resume`.
    resume_value: Value,
    yielded: Vec<Value>,
    return_value: Option<Value>,
    /// The thrown value, once a catch case has been jumped to but not yet consumed by
    /// `enterCatchBlock`.
    uncaught: Option<Value>,
    /// An exception that escaped with no active catch — the generator is finished, and this is
    /// what a real `.throw()`/`.next()` would rethrow to the caller.
    thrown: Option<Value>,
    catch_target: Option<i64>,
    finally_target: Option<i64>,
    /// Stashed by `leaveTryBlock`/`jumpThroughFinallyBlocks` so `leaveFinallyBlock` knows where to
    /// resume once the finally block itself completes normally.
    finally_continue_to: Option<i64>,
    paused: bool,
    finished: bool,
}

impl StepMachine {
    fn new(arena: Arena, function: NodeId) -> Self {
        let switch_cases = extract_cases(&arena, function);
        Self {
            arena,
            switch_cases,
            context_var: context_name(0),
            vars: HashMap::new(),
            next_address: ENTRY_ID as i64,
            resume_value: Value::Undefined,
            yielded: Vec::new(),
            return_value: None,
            uncaught: None,
            thrown: None,
            catch_target: None,
            finally_target: None,
            finally_continue_to: None,
            paused: false,
            finished: false,
        }
    }

    fn set_var(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }

    fn start(&mut self) {
        self.next_address = ENTRY_ID as i64;
        self.drive();
    }

    fn resume(&mut self, value: Value) {
        if self.finished {
            return;
        }
        self.resume_value = value;
        self.paused = false;
        self.drive();
    }

    fn throw(&mut self, value: Value) {
        if self.finished {
            return;
        }
        self.raise(value);
        self.paused = false;
        self.drive();
    }

    fn drive(&mut self) {
        while !self.paused && !self.finished {
            self.run_one_pass();
        }
    }

    /// One call to the generated `program(context)`: find the case matching `next_address` and
    /// run it and (per ordinary switch fallthrough) everything after it, until something ends the
    /// pass.
    fn run_one_pass(&mut self) {
        let Some(start) = self.switch_cases.iter().position(|&(id, _)| id == self.next_address)
        else {
            // No case owns this address — the only id that never gets a case is
            // `PROGRAM_END_ID`, so this is the generator completing.
            self.finished = true;
            return;
        };
        let bodies: Vec<NodeId> = self.switch_cases[start..].iter().map(|&(_, b)| b).collect();
        for body in bodies {
            match self.exec_stmt(body) {
                Signal::Continue => continue,
                Signal::Break | Signal::Stop => return,
            }
        }
    }

    /// An exception arriving either from a `throw` statement the generated code executed, or
    /// injected from outside via `Self::throw`: jump to the active catch if there is one, otherwise
    /// finish the generator with nothing left to resume.
    fn raise(&mut self, value: Value) {
        match self.catch_target.take() {
            Some(cc) => {
                self.uncaught = Some(value);
                self.next_address = cc;
            }
            None => {
                self.thrown = Some(value);
                self.finished = true;
            }
        }
    }

    fn exec_stmt(&mut self, node: NodeId) -> Signal {
        match self.arena.kind(node).clone() {
            NodeKind::Block => self.exec_stmt_list(node),
            NodeKind::ExprStmt => {
                let e = self.arena.expr_stmt_expr(node);
                self.eval_expr(e);
                Signal::Continue
            }
            NodeKind::VarDecl => {
                self.exec_var_decl(node);
                Signal::Continue
            }
            NodeKind::If { .. } => self.exec_if(node),
            NodeKind::Return { .. } => self.exec_return(node),
            NodeKind::Throw { .. } => self.exec_throw(node),
            NodeKind::Break { .. } => Signal::Break,
            NodeKind::Switch { .. } => self.exec_switch(node),
            other => panic!("StepMachine: unsupported generated statement {other:?}"),
        }
    }

    fn exec_stmt_list(&mut self, block: NodeId) -> Signal {
        for stmt in self.arena.children(block) {
            match self.exec_stmt(stmt) {
                Signal::Continue => continue,
                other => return other,
            }
        }
        Signal::Continue
    }

    fn exec_var_decl(&mut self, node: NodeId) {
        for d in self.arena.children(node) {
            let name = self.arena.var_declarator_name(d).to_string();
            let value = match self.arena.var_declarator_init(d) {
                Some(init) => self.eval_expr(init),
                None => Value::Undefined,
            };
            self.vars.insert(name, value);
        }
    }

    fn exec_if(&mut self, node: NodeId) -> Signal {
        let (cond, then_branch, else_branch) = self.arena.if_parts(node);
        let c = self.eval_expr(cond);
        if truthy(&c) {
            self.exec_stmt(then_branch)
        } else if let Some(e) = else_branch {
            self.exec_stmt(e)
        } else {
            Signal::Continue
        }
    }

    fn exec_return(&mut self, node: NodeId) -> Signal {
        // Every `return` surviving into generated code wraps a `context.<method>(...)` call
        // (§4.4.e/§4.5 `fix_return`) — its side effects are what matters, not its JS-level value.
        if let Some(value) = self.arena.return_value(node) {
            self.eval_expr(value);
        }
        Signal::Stop
    }

    fn exec_throw(&mut self, node: NodeId) -> Signal {
        let value = self.arena.throw_value(node);
        let v = self.eval_expr(value);
        self.raise(v);
        Signal::Stop
    }

    /// Only ever a switch the original source wrote (§4.4.l embeds it unchanged, case bodies past
    /// the first yield-containing one replaced with jump stubs) — never the generated dispatch
    /// switch itself, which `run_one_pass` walks directly. A `break` here only exits this nested
    /// switch and must not escape to end the whole pass, so it is swallowed back into `Continue`;
    /// a `Stop` (a real `return`, e.g. a jump stub) is not swallowed and ends the pass exactly the
    /// way a `return` statement would in real JS.
    fn exec_switch(&mut self, node: NodeId) -> Signal {
        let (disc, cases) = self.arena.switch_parts(node);
        let disc_val = self.eval_expr(disc);

        let mut start = None;
        for (i, &c) in cases.iter().enumerate() {
            if let (Some(t), _) = self.arena.switch_case_parts(c) {
                if self.eval_expr(t) == disc_val {
                    start = Some(i);
                    break;
                }
            }
        }
        if start.is_none() {
            start = cases.iter().position(|&c| self.arena.switch_case_parts(c).0.is_none());
        }
        let Some(start) = start else {
            return Signal::Continue;
        };

        for &c in &cases[start..] {
            let (_, body) = self.arena.switch_case_parts(c);
            match self.exec_stmt(body) {
                Signal::Break => return Signal::Continue,
                Signal::Stop => return Signal::Stop,
                Signal::Continue => continue,
            }
        }
        Signal::Continue
    }

    fn is_context_var(&self, node: NodeId) -> bool {
        self.arena.is_name(node) && self.arena.name_of(node).as_str() == self.context_var.as_str()
    }

    fn eval_expr(&mut self, node: NodeId) -> Value {
        match self.arena.kind(node).clone() {
            NodeKind::Literal(lit) => literal_to_value(&lit),
            NodeKind::Name { name } => self.vars.get(name.as_str()).cloned().unwrap_or(Value::Undefined),
            NodeKind::Assign { target, value } => {
                let v = self.eval_expr(value);
                let name = self.arena.name_of(target).to_string();
                self.vars.insert(name, v.clone());
                v
            }
            NodeKind::Binary { op, left, right } => self.eval_binary(op.as_str(), left, right),
            NodeKind::Unary { op, argument } => self.eval_unary(op.as_str(), argument),
            NodeKind::Member { object, property } => self.eval_member(object, property.as_str()),
            NodeKind::Call { callee, args } => self.eval_call(callee, &args),
            other => panic!("StepMachine: unsupported generated expression {other:?}"),
        }
    }

    fn eval_binary(&mut self, op: &str, left: NodeId, right: NodeId) -> Value {
        let l = self.eval_expr(left);
        let r = self.eval_expr(right);
        match op {
            "+" => match (l, r) {
                (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
                (Value::Str(a), Value::Str(b)) => Value::Str(a + &b),
                (Value::Str(a), Value::Number(b)) => Value::Str(format!("{a}{b}")),
                (Value::Number(a), Value::Str(b)) => Value::Str(format!("{a}{b}")),
                (a, b) => panic!("StepMachine: unsupported `+` operands {a:?}, {b:?}"),
            },
            "!=" => Value::Bool(l != r),
            "==" => Value::Bool(l == r),
            other => panic!("StepMachine: unsupported binary operator {other}"),
        }
    }

    fn eval_unary(&mut self, op: &str, argument: NodeId) -> Value {
        let v = self.eval_expr(argument);
        match op {
            "!" => Value::Bool(!truthy(&v)),
            other => panic!("StepMachine: unsupported unary operator {other}"),
        }
    }

    fn eval_member(&mut self, object: NodeId, property: &str) -> Value {
        if self.is_context_var(object) && property == "yieldResult" {
            return self.resume_value.clone();
        }
        panic!("StepMachine: unsupported member read .{property}")
    }

    fn eval_call(&mut self, callee: NodeId, args: &[NodeId]) -> Value {
        if let NodeKind::Member { object, property } = self.arena.kind(callee).clone() {
            if self.is_context_var(object) {
                return self.context_call(property.as_str(), args);
            }
            if property.as_str() == "getNext" {
                return self.iterator_next(object);
            }
        }
        panic!("StepMachine: unsupported call expression")
    }

    fn arg_case_id(&mut self, args: &[NodeId], idx: usize) -> i64 {
        match self.eval_expr(args[idx]) {
            Value::Number(n) => n,
            other => panic!("StepMachine: expected a numeric case id, got {other:?}"),
        }
    }

    fn iterator_next(&mut self, object: NodeId) -> Value {
        let name = self.arena.name_of(object);
        match self.vars.get(name.as_str()) {
            Some(Value::Keys(q)) => match q.borrow_mut().pop_front() {
                Some(k) => Value::Str(k),
                None => Value::Null,
            },
            other => panic!("StepMachine: `{name}` is not a for-in iterator: {other:?}"),
        }
    }

    /// The runtime method-call surface (§6): every `context.<method>(...)` the lowering emits.
    fn context_call(&mut self, method: &str, args: &[NodeId]) -> Value {
        match method {
            "jumpTo" => {
                self.next_address = self.arg_case_id(args, 0);
                Value::Undefined
            }
            "jumpToEnd" => {
                self.next_address = PROGRAM_END_ID as i64;
                Value::Undefined
            }
            "yield" | "yieldAll" => {
                let v = self.eval_expr(args[0]);
                self.yielded.push(v);
                self.next_address = self.arg_case_id(args, 1);
                self.paused = true;
                Value::Undefined
            }
            "return" => {
                let v = self.eval_expr(args[0]);
                self.return_value = Some(v);
                self.finished = true;
                Value::Undefined
            }
            "forIn" => self.eval_expr(args[0]),
            "setFinallyBlock" => {
                self.finally_target = Some(self.arg_case_id(args, 0));
                Value::Undefined
            }
            "setCatchFinallyBlocks" => {
                self.catch_target = Some(self.arg_case_id(args, 0));
                if args.len() > 1 {
                    self.finally_target = Some(self.arg_case_id(args, 1));
                }
                Value::Undefined
            }
            "leaveTryBlock" | "jumpThroughFinallyBlocks" => {
                let target = self.arg_case_id(args, 0);
                self.catch_target = None;
                match self.finally_target.take() {
                    Some(fc) => {
                        self.finally_continue_to = Some(target);
                        self.next_address = fc;
                    }
                    None => self.next_address = target,
                }
                Value::Undefined
            }
            "enterCatchBlock" => {
                if !args.is_empty() {
                    self.finally_target = Some(self.arg_case_id(args, 0));
                }
                self.uncaught.take().unwrap_or(Value::Undefined)
            }
            "enterFinallyBlock" => Value::Undefined,
            "leaveFinallyBlock" => {
                self.next_address = self.finally_continue_to.take().unwrap_or(PROGRAM_END_ID as i64);
                Value::Undefined
            }
            other => panic!("StepMachine: unsupported context method {other}"),
        }
    }
}

/// Navigates from the lowered top-level function down to its generated dispatch switch's cases:
/// `function` body is `[...hoisted decls, return runtime.createGenerator(selfName, programFn)]`;
/// `programFn`'s body is the (optionally `do {..} while(0)`-wrapped) `switch(context.nextAddress)`
/// built by `assemble_program`.
fn extract_cases(arena: &Arena, function: NodeId) -> Vec<(i64, NodeId)> {
    let body = arena.function_body(function);
    let return_stmt = *arena
        .children(body)
        .iter()
        .rev()
        .find(|&&c| arena.is_return(c))
        .expect("lowered generator body must end in a return statement");
    let create_call = arena
        .return_value(return_stmt)
        .expect("createGenerator return must carry a value");
    let (_, args) = arena.call_parts(create_call);
    let program_fn = args[1];
    let program_body = arena.function_body(program_fn);
    let top = arena.children(program_body)[0];
    let switch_node = if arena.is_do_while(top) {
        let (inner, _cond) = arena.do_while_parts(top);
        arena.children(inner)[0]
    } else {
        top
    };
    let (_, cases) = arena.switch_parts(switch_node);
    cases
        .iter()
        .map(|&c| {
            let (test, body) = arena.switch_case_parts(c);
            let id = arena
                .as_number(test.expect("generated switch case must have a numeric test"))
                .expect("generated switch case test must be a number literal");
            (id, body)
        })
        .collect()
}

/// Builds a generator function via `build`, then runs the full lowering pass over it exactly the
/// way `GeneratorLoweringPass::run` is meant to be used, asserting no diagnostics were emitted.
fn lower(build: impl FnOnce(&mut Arena) -> NodeId) -> (Arena, NodeId) {
    let mut arena = Arena::new();
    let func = build(&mut arena);

    let diagnostics = DiagnosticsHandler::new();
    let mut decomposer = DefaultExpressionDecomposer::new();
    let mut cfg = SimpleCfgOracle::new();
    let mut pass = GeneratorLoweringPass::new(&diagnostics, &mut decomposer, &mut cfg, EmitOptions::default());
    pass.run(&mut arena, func);
    assert!(diagnostics.is_empty(), "unexpected diagnostics during lowering");

    (arena, func)
}

// ---- scenarios -----------------------------------------------------------------------------------

#[test]
fn scenario_1_single_yield() {
    // function* gen() { yield 1; }
    let (arena, func) = lower(|arena| {
        let f = arena.make_function(Some("gen"), &[], true);
        let body = arena.function_body(f);
        let one = arena.make_number(1);
        let y = arena.make_yield(Some(one), false);
        let stmt = arena.make_expr_stmt(y);
        arena.add_child_to_back(body, stmt);
        f
    });

    let mut m = StepMachine::new(arena, func);
    m.start();
    assert_eq!(m.yielded, vec![Value::Number(1)]);
    assert!(!m.finished);

    m.resume(Value::Undefined);
    assert!(m.finished);
    assert_eq!(m.return_value, None);
}

#[test]
fn scenario_2_yield_embedded_in_binary_expression() {
    // function* gen() {
    //   var a = 10;
    //   var sum = a + (yield 5);
    //   return sum;
    // }
    let (arena, func) = lower(|arena| {
        let f = arena.make_function(Some("gen"), &[], true);
        let body = arena.function_body(f);

        let ten = arena.make_number(10);
        let a_decl = arena.make_var_declarator("a", Some(ten));
        let a_var = arena.make_var_decl(&[a_decl]);
        arena.add_child_to_back(body, a_var);

        let a_ref = arena.make_name("a");
        let five = arena.make_number(5);
        let y = arena.make_yield(Some(five), false);
        let sum_init = arena.make_binary("+", a_ref, y);
        let sum_decl = arena.make_var_declarator("sum", Some(sum_init));
        let sum_var = arena.make_var_decl(&[sum_decl]);
        arena.add_child_to_back(body, sum_var);

        let sum_ref = arena.make_name("sum");
        let ret = arena.make_return(Some(sum_ref));
        arena.add_child_to_back(body, ret);

        f
    });

    let mut m = StepMachine::new(arena, func);
    m.start();
    assert_eq!(m.yielded, vec![Value::Number(5)]);
    assert!(!m.finished);

    m.resume(Value::Number(100));
    assert!(m.finished);
    assert_eq!(m.return_value, Some(Value::Number(110)));
}

#[test]
fn scenario_3_labeled_break_through_an_active_finally() {
    // function* gen() {
    //   outer: try {
    //     yield 1;
    //     break outer;
    //   } finally {
    //     yield 2;
    //   }
    //   yield 3;
    // }
    let (arena, func) = lower(|arena| {
        let f = arena.make_function(Some("gen"), &[], true);
        let body = arena.function_body(f);

        let one = arena.make_number(1);
        let y1 = arena.make_yield(Some(one), false);
        let y1_stmt = arena.make_expr_stmt(y1);
        let brk = arena.make_break(Some("outer"));
        let try_block = block_of(arena, &[y1_stmt, brk]);

        let two = arena.make_number(2);
        let y2 = arena.make_yield(Some(two), false);
        let y2_stmt = arena.make_expr_stmt(y2);
        let finally_block = block_of(arena, &[y2_stmt]);

        let try_node = arena.make_try(try_block, None, Some(finally_block));
        let labeled = arena.make_label("outer", try_node);
        arena.add_child_to_back(body, labeled);

        let three = arena.make_number(3);
        let y3 = arena.make_yield(Some(three), false);
        let y3_stmt = arena.make_expr_stmt(y3);
        arena.add_child_to_back(body, y3_stmt);

        f
    });

    let mut m = StepMachine::new(arena, func);
    m.start();
    assert_eq!(m.yielded, vec![Value::Number(1)]);

    // Resumes the `yield 1`, runs into `break outer`, which must detour through the finally
    // block (`jumpThroughFinallyBlocks`, not a plain `jumpTo`) before reaching its target.
    m.resume(Value::Undefined);
    assert_eq!(m.yielded, vec![Value::Number(1), Value::Number(2)]);
    assert!(!m.finished);

    // Resumes the finally's `yield 2`; `leaveFinallyBlock` must send control to the label's
    // break case (not straight to the end of the function) for `yield 3` to ever run.
    m.resume(Value::Undefined);
    assert_eq!(m.yielded, vec![Value::Number(1), Value::Number(2), Value::Number(3)]);
    assert!(!m.finished);

    m.resume(Value::Undefined);
    assert!(m.finished);
    assert_eq!(m.return_value, None);
}

#[test]
fn scenario_4_for_in_with_yield() {
    // function* gen(obj) {
    //   for (var k in obj) {
    //     yield k;
    //   }
    // }
    let (arena, func) = lower(|arena| {
        let f = arena.make_function(Some("gen"), &["obj"], true);
        let body = arena.function_body(f);

        let k_ref = arena.make_name("k");
        let y = arena.make_yield(Some(k_ref), false);
        let y_stmt = arena.make_expr_stmt(y);
        let loop_body = block_of(arena, &[y_stmt]);

        let obj_ref = arena.make_name("obj");
        let for_in = arena.make_for_in("k", obj_ref, loop_body);
        arena.add_child_to_back(body, for_in);

        f
    });

    let mut m = StepMachine::new(arena, func);
    // A free variable a real host AST would resolve from the enclosing scope; pre-seeding it is
    // a harness simplification, not a claim about how `obj` actually got its value.
    let keys = Rc::new(RefCell::new(VecDeque::from(["a".to_string(), "b".to_string()])));
    m.set_var("obj", Value::Keys(keys));

    m.start();
    assert_eq!(m.yielded, vec![Value::Str("a".into())]);

    m.resume(Value::Undefined);
    assert_eq!(m.yielded, vec![Value::Str("a".into()), Value::Str("b".into())]);
    assert!(!m.finished);

    m.resume(Value::Undefined);
    assert!(m.finished);
    assert_eq!(m.return_value, None);
}

#[test]
fn scenario_5_try_catch_receives_an_injected_throw() {
    // function* gen() {
    //   try {
    //     yield 1;
    //   } catch (e) {
    //     yield e;
    //   }
    // }
    let (arena, func) = lower(|arena| {
        let f = arena.make_function(Some("gen"), &[], true);
        let body = arena.function_body(f);

        let one = arena.make_number(1);
        let y1 = arena.make_yield(Some(one), false);
        let y1_stmt = arena.make_expr_stmt(y1);
        let try_block = block_of(arena, &[y1_stmt]);

        let e_ref = arena.make_name("e");
        let y2 = arena.make_yield(Some(e_ref), false);
        let y2_stmt = arena.make_expr_stmt(y2);
        let catch_block = block_of(arena, &[y2_stmt]);

        let try_node = arena.make_try(try_block, Some(("e", catch_block)), None);
        arena.add_child_to_back(body, try_node);

        f
    });

    let mut m = StepMachine::new(arena, func);
    m.start();
    assert_eq!(m.yielded, vec![Value::Number(1)]);
    assert!(!m.finished);

    // Simulates `gen.throw("boom")` while suspended inside the try body: the active catch
    // registration (`setCatchFinallyBlocks`) must redirect into the catch case rather than
    // escaping, and `enterCatchBlock` must hand back the thrown value as `e`.
    m.throw(Value::Str("boom".into()));
    assert_eq!(m.yielded, vec![Value::Number(1), Value::Str("boom".into())]);
    assert!(!m.finished);

    m.resume(Value::Undefined);
    assert!(m.finished);
    assert_eq!(m.return_value, None);
    assert_eq!(m.thrown, None);
}

#[test]
fn scenario_6_switch_with_a_yielding_case_body() {
    // function* gen(x) {
    //   switch (x) {
    //     case 1:
    //       yield 10;
    //       break;
    //     case 2:
    //       yield 20;
    //       break;
    //   }
    //   yield 999;
    // }
    //
    // Regression test for the `lower_switch` stub-case fix (see DESIGN.md): a matched case's
    // stub body must `return context.jumpTo(generated)`, not `context.jumpTo(generated); break;`,
    // or the unconditional jump emitted right after the embedded switch clobbers the address
    // before the case actually containing `yield 20` ever gets a chance to run.
    let (arena, func) = lower(|arena| {
        let f = arena.make_function(Some("gen"), &["x"], true);
        let body = arena.function_body(f);

        let ten = arena.make_number(10);
        let y10 = arena.make_yield(Some(ten), false);
        let y10_stmt = arena.make_expr_stmt(y10);
        let brk1 = arena.make_break(None);
        let case1_body = block_of(arena, &[y10_stmt, brk1]);
        let one = arena.make_number(1);
        let case1 = arena.make_switch_case(Some(one), case1_body);

        let twenty = arena.make_number(20);
        let y20 = arena.make_yield(Some(twenty), false);
        let y20_stmt = arena.make_expr_stmt(y20);
        let brk2 = arena.make_break(None);
        let case2_body = block_of(arena, &[y20_stmt, brk2]);
        let two = arena.make_number(2);
        let case2 = arena.make_switch_case(Some(two), case2_body);

        let x_ref = arena.make_name("x");
        let switch_node = arena.make_switch(x_ref, &[case1, case2]);
        arena.add_child_to_back(body, switch_node);

        let nine99 = arena.make_number(999);
        let y999 = arena.make_yield(Some(nine99), false);
        let y999_stmt = arena.make_expr_stmt(y999);
        arena.add_child_to_back(body, y999_stmt);

        f
    });

    let mut m = StepMachine::new(arena, func);
    m.set_var("x", Value::Number(2));

    m.start();
    assert_eq!(m.yielded, vec![Value::Number(20)]);
    assert!(!m.finished);

    m.resume(Value::Undefined);
    assert_eq!(m.yielded, vec![Value::Number(20), Value::Number(999)]);
    assert!(!m.finished);

    m.resume(Value::Undefined);
    assert!(m.finished);
    assert_eq!(m.return_value, None);
}
