//! Benchmarks for the IL codec.
//!
//! Measures decoding and encoding of instruction streams:
//! - A straight-line stream of simple opcodes
//! - A branch heavy stream with short and long targets
//! - A `switch` dispatch with many targets
//! - A full method body including its fat header and exception clauses

extern crate cilmerge;

use cilmerge::{
    assembly::{decode_stream, encode_stream, Instruction, OpCode, Operand},
    metadata::{
        method::{ExceptionHandler, ExceptionHandlerFlags, MethodBody},
        tables::{TableId, TableIndex},
    },
};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn straight_line(count: usize) -> Vec<Instruction> {
    let field = TableIndex::new(TableId::FIELD, 3);
    let mut instructions = Vec::with_capacity(count * 4 + 1);
    for _ in 0..count {
        instructions.push(Instruction::simple(OpCode::Ldarg0));
        instructions.push(Instruction::new(OpCode::Ldfld, Operand::Token(field)).unwrap());
        instructions.push(Instruction::new(OpCode::LdcI4S, Operand::Int8(7)).unwrap());
        instructions.push(Instruction::simple(OpCode::Add));
    }
    instructions.push(Instruction::simple(OpCode::Ret));
    instructions
}

fn branchy(count: usize) -> Vec<Instruction> {
    let mut instructions = Vec::with_capacity(count * 3 + 1);
    for index in 0..count {
        instructions.push(Instruction::simple(OpCode::Ldarg1));
        if index % 2 == 0 {
            instructions.push(Instruction::branch(OpCode::BrtrueS, 1));
        } else {
            instructions.push(Instruction::branch(OpCode::Brtrue, 1));
        }
        instructions.push(Instruction::simple(OpCode::Nop));
    }
    instructions.push(Instruction::simple(OpCode::Ret));
    instructions
}

fn encode(instructions: &[Instruction]) -> Vec<u8> {
    encode_stream(instructions, &mut |_| unreachable!()).unwrap()
}

/// Benchmark decoding 4001 simple instructions.
fn bench_decode_straight_line(c: &mut Criterion) {
    let code = encode(&straight_line(1000));

    c.bench_function("il_decode_straight_line", |b| {
        b.iter(|| {
            let instructions = decode_stream(black_box(&code), &mut |_| unreachable!()).unwrap();
            black_box(instructions)
        });
    });
}

/// Benchmark encoding the same stream.
fn bench_encode_straight_line(c: &mut Criterion) {
    let instructions = straight_line(1000);

    c.bench_function("il_encode_straight_line", |b| {
        b.iter(|| black_box(encode(black_box(&instructions))));
    });
}

/// Benchmark decoding a stream where every other instruction is a branch.
fn bench_decode_branches(c: &mut Criterion) {
    let code = encode(&branchy(1000));

    c.bench_function("il_decode_branches", |b| {
        b.iter(|| {
            let instructions = decode_stream(black_box(&code), &mut |_| unreachable!()).unwrap();
            black_box(instructions)
        });
    });
}

/// Benchmark a 256-way switch.
fn bench_decode_switch(c: &mut Criterion) {
    let targets: Vec<i32> = (0..256).collect();
    let mut instructions = vec![Instruction::new(OpCode::Switch, Operand::Switch(targets)).unwrap()];
    instructions.extend(std::iter::repeat(Instruction::simple(OpCode::Nop)).take(256));
    instructions.push(Instruction::simple(OpCode::Ret));
    let code = encode(&instructions);

    c.bench_function("il_decode_switch_256", |b| {
        b.iter(|| {
            let instructions = decode_stream(black_box(&code), &mut |_| unreachable!()).unwrap();
            black_box(instructions)
        });
    });
}

/// Benchmark a fat method body with a try/finally clause.
fn bench_method_body(c: &mut Criterion) {
    let mut instructions = straight_line(50);
    instructions.pop();
    let try_length = instructions.iter().map(Instruction::size).sum::<usize>() as u32;
    instructions.push(Instruction::branch(OpCode::LeaveS, 1));
    instructions.push(Instruction::simple(OpCode::Endfinally));
    instructions.push(Instruction::simple(OpCode::Ret));

    let body = MethodBody {
        max_stack: 2,
        init_locals: true,
        local_var_sig: Some(TableIndex::new(TableId::STANDALONE_SIG, 0)),
        instructions,
        exception_handlers: vec![ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_offset: 0,
            try_length: try_length + 2,
            handler_offset: try_length + 2,
            handler_length: 1,
            class_token: None,
            filter_offset: 0,
        }],
    };
    let data = body.encode(&mut |_| unreachable!()).unwrap();

    c.bench_function("il_method_body_encode", |b| {
        b.iter(|| black_box(black_box(&body).encode(&mut |_| unreachable!()).unwrap()));
    });
    c.bench_function("il_method_body_parse", |b| {
        b.iter(|| {
            let parsed = MethodBody::parse(black_box(&data), &mut |_| unreachable!()).unwrap();
            black_box(parsed)
        });
    });
}

criterion_group!(
    benches,
    bench_decode_straight_line,
    bench_encode_straight_line,
    bench_decode_branches,
    bench_decode_switch,
    bench_method_body,
);
criterion_main!(benches);
