extern crate auditor_core;

use auditor_core::model::InvocationPattern;
use auditor_core::{dataflow, indexer, store::Store};
use pretty_assertions::assert_eq;

const FIXTURE: &str = r#".class public Lcom/example/Flows;
.super Ljava/lang/Object;

.field private static FLAG:Ljava/lang/String;

.method public static constructor <clinit>()V
    .registers 1
    const-string v0, "const.flag"
    sput-object v0, Lcom/example/Flows;->FLAG:Ljava/lang/String;
    return-void
.end method

.method public writeSettings()V
    .registers 4
    const-string v1, "settings.dat"
    const/4 v2, 0x1
    invoke-virtual {p0, v1, v2}, Landroid/content/Context;->openFileOutput(Ljava/lang/String;I)Ljava/io/FileOutputStream;
    move-result-object v0
    return-void
.end method

.method public probeAdb()V
    .registers 4
    const-string v3, "adb_enabled"
    move-object v1, v3
    invoke-static {v0, v1, v2}, Landroid/provider/Settings$Global;->getInt(Landroid/content/ContentResolver;Ljava/lang/String;I)I
    move-result v0
    return-void
.end method

.method public branches(Z)V
    .registers 4
    if-eqz p1, :cond_0
    const-string v1, "alpha"
    goto :goto_0
    :cond_0
    const-string v1, "beta"
    :goto_0
    invoke-static {v1}, Lcom/example/Sink;->use(Ljava/lang/String;)V
    return-void
.end method

.method public readFlag()V
    .registers 2
    sget-object v1, Lcom/example/Flows;->FLAG:Ljava/lang/String;
    invoke-static {v1}, Lcom/example/Sink;->use(Ljava/lang/String;)V
    return-void
.end method

.method public makeWidget()V
    .registers 4
    new-instance v1, Lcom/example/Widget;
    move-object v2, v1
    invoke-virtual {p0, v2}, Lcom/example/Flows;->take(Ljava/lang/Object;)V
    return-void
.end method
"#;

fn indexed_store() -> Store {
	let store = Store::open_in_memory().unwrap();
	store.file_put("smali/com/example/Flows.smali", FIXTURE.as_bytes()).unwrap();
	indexer::analyze_with_pacing(&store, false).unwrap();
	store
}

fn site(store: &Store, prefix: &str, value: &str) -> auditor_core::model::Op {
	store
		.query()
		.invocations(&InvocationPattern::new(prefix, value).unwrap())
		.unwrap()
		.remove(0)
}

#[test]
fn folds_the_constant_reaching_an_argument() {
	let store = indexed_store();
	let call = site(&store, "invoke-virtual", "openFileOutput");

	assert_eq!(dataflow::solved_constant_data_in_invocation(&store, &call, 0), Ok("settings.dat".to_string()));
	assert_eq!(dataflow::solved_constant_data_in_invocation(&store, &call, 1), Ok("0x1".to_string()));
}

#[test]
fn resolves_move_chains() {
	let store = indexed_store();
	let call = site(&store, "invoke-static", "getInt");

	assert_eq!(dataflow::solved_constant_data_in_invocation(&store, &call, 1), Ok("adb_enabled".to_string()));
}

#[test]
fn dead_registers_yield_no_value() {
	let store = indexed_store();
	let call = site(&store, "invoke-static", "getInt");

	// Nothing in the method writes the first or third argument register.
	assert_eq!(dataflow::solved_constant_data_in_invocation(&store, &call, 0), Err(dataflow::NoSuchValueError));
	assert_eq!(dataflow::solved_constant_data_in_invocation(&store, &call, 2), Err(dataflow::NoSuchValueError));
}

#[test]
fn unions_producers_across_branches() {
	let store = indexed_store();
	let call = site(&store, "invoke-static", r"Lcom/example/Sink;->use");

	let possible = dataflow::solved_possible_constant_data_in_invocation(&store, &call, 0);

	assert_eq!(
		possible.into_iter().collect::<Vec<_>>(),
		vec!["alpha".to_string(), "beta".to_string()]
	);
}

#[test]
fn follows_field_loads_to_their_unique_initializer() {
	let store = indexed_store();

	let calls = store
		.query()
		.invocations(&InvocationPattern::new("invoke-static", r"Lcom/example/Sink;->use").unwrap())
		.unwrap();
	let read_flag = calls
		.iter()
		.find(|c| {
			store
				.query()
				.qualname_of(c)
				.unwrap()
				.is_some_and(|qn| qn.contains("readFlag"))
		})
		.unwrap();

	assert_eq!(
		dataflow::solved_constant_data_in_invocation(&store, read_flag, 0),
		Ok("const.flag".to_string())
	);
}

#[test]
fn collects_the_typeset_assigned_into_a_register() {
	let store = indexed_store();
	let call = site(&store, "invoke-virtual", r"Lcom/example/Flows;->take");

	let types = dataflow::solved_typeset_in_invocation(&store, &call, 0);

	assert_eq!(types.into_iter().collect::<Vec<_>>(), vec!["Lcom/example/Widget;".to_string()]);
}

#[test]
fn resolution_is_deterministic_over_one_snapshot() {
	let store = indexed_store();
	let call = site(&store, "invoke-virtual", "openFileOutput");

	let first = dataflow::solved_constant_data_in_invocation(&store, &call, 1);
	let second = dataflow::solved_constant_data_in_invocation(&store, &call, 1);

	assert_eq!(first, second);
}
