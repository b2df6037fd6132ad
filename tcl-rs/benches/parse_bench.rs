use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tcl::Interp;

fn quiet_interp() -> Interp {
    let mut tcl = Interp::new();
    tcl.set_out(Box::new(std::io::sink()));
    tcl.set_err(Box::new(std::io::sink()));
    tcl
}

fn make_loop_script(iters: usize) -> String {
    format!(
        "set total 0\n\
         for {{set i 0}} {{$i < {iters}}} {{incr i}} {{\n\
         \tset total [expr $total + $i]\n\
         }}\n\
         set total"
    )
}

fn make_list_script(len: usize) -> String {
    let mut script = String::from("set l {}\n");
    for i in 0..len {
        script.push_str(&format!("lappend l item{i}\n"));
    }
    script.push_str("llength [lsort $l]");
    script
}

fn bench_interpreter(c: &mut Criterion) {
    let mut g = c.benchmark_group("interpreter");

    g.bench_function("set_and_substitute", |b| {
        let mut tcl = quiet_interp();
        let script = "set a hello\nset b $a\nset c [set b]";
        b.iter(|| tcl.parse_string(black_box(script)))
    });

    g.bench_function("expr_loop_100", |b| {
        let mut tcl = quiet_interp();
        let script = make_loop_script(100);
        b.iter(|| tcl.parse_string(black_box(&script)))
    });

    g.bench_function("list_build_100", |b| {
        let mut tcl = quiet_interp();
        let script = make_list_script(100);
        b.iter(|| tcl.parse_string(black_box(&script)))
    });

    g.bench_function("proc_calls_100", |b| {
        let mut tcl = quiet_interp();
        tcl.parse_string("proc add {a b} { expr $a + $b }").unwrap();
        let script = "for {set i 0} {$i < 100} {incr i} { add $i $i }";
        b.iter(|| tcl.parse_string(black_box(script)))
    });

    g.bench_function("string_ops", |b| {
        let mut tcl = quiet_interp();
        let script = "set s {The quick brown fox jumps over the lazy dog}\n\
                      string map {quick slow dog cat} $s\n\
                      string match *fox* $s\n\
                      string range $s 4 end";
        b.iter(|| tcl.parse_string(black_box(script)))
    });

    g.finish();
}

criterion_group!(benches, bench_interpreter);
criterion_main!(benches);
