use jvmasm::jvm::class_file::{ClassFile, StackMapTable};
use jvmasm::jvm::code::{ArithmeticOp, BranchCondition, MethodBuilder, NumericKind};
use jvmasm::jvm::verifier::VerificationType;
use jvmasm::jvm::{
    ClassAccessFlags, ClassBuilder, Error, FieldType, MethodAccessFlags, MethodDescriptor,
    RenderDescriptor,
};

use clap::{value_parser, Arg, ArgMatches, Command};
use std::fs;
use std::path::PathBuf;
use std::process;

fn main() -> Result<(), Error> {
    env_logger::init();

    let matches = Command::new("JVM class file assembler")
        .version(clap::crate_version!())
        .author("Alec Theriault <alec.theriault@gmail.com>")
        .about("Read, check, and assemble JVM class files")
        .subcommand_required(true)
        .subcommand(
            Command::new("inspect")
                .about("Print the contents of a class file, decoding method bodies")
                .arg(input_arg()),
        )
        .subcommand(
            Command::new("roundtrip")
                .about("Check that re-writing a class file reproduces it byte for byte")
                .arg(input_arg()),
        )
        .subcommand(
            Command::new("demo")
                .about("Assemble a small class with a couple of branching methods")
                .arg(
                    Arg::new("class")
                        .long("output-class")
                        .value_name("CLASS_NAME")
                        .required(true)
                        .help("Output class name (eg. `foo/bar/Baz`)"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .value_name("PATH")
                        .value_parser(value_parser!(PathBuf))
                        .help("Where to write the class (defaults to `<CLASS_NAME>.class`)"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("inspect", sub_matches)) => inspect(&read_input(sub_matches)?),
        Some(("roundtrip", sub_matches)) => roundtrip(&read_input(sub_matches)?),
        Some(("demo", sub_matches)) => demo(sub_matches),
        _ => Ok(()),
    }
}

fn input_arg() -> Arg {
    Arg::new("INPUT")
        .help("Class file to read")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .index(1)
}

fn read_input(matches: &ArgMatches) -> Result<Vec<u8>, Error> {
    match matches.get_one::<PathBuf>("INPUT") {
        Some(path) => {
            log::info!("Reading '{}'", path.display());
            Ok(fs::read(path)?)
        }
        None => Ok(vec![]),
    }
}

fn inspect(bytes: &[u8]) -> Result<(), Error> {
    let class = ClassFile::parse(bytes)?;
    println!("{:#?}", class);

    for method in &class.methods {
        let name = class.lookup_utf8(method.name_index).unwrap_or("<invalid>");
        let descriptor = class
            .lookup_utf8(method.descriptor_index)
            .unwrap_or("<invalid>");
        match method.code(&class.constants) {
            None => println!("{}{}: no code", name, descriptor),
            Some(code) => {
                let code = code?;
                println!(
                    "{}{}: max_stack={} max_locals={} code={:02x?}",
                    name, descriptor, code.max_stack, code.max_locals, code.code_array.0
                );
                for attribute in &code.attributes {
                    if let Some(table) = attribute.parse_if::<StackMapTable>(&class.constants) {
                        for frame in table?.0 {
                            println!("  {:?}", frame);
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn roundtrip(bytes: &[u8]) -> Result<(), Error> {
    let class = ClassFile::parse(bytes)?;
    let written = class.to_bytes()?;
    if written == bytes {
        log::info!("Round trip reproduced all {} bytes", bytes.len());
        Ok(())
    } else {
        let first_difference = written
            .iter()
            .zip(bytes)
            .position(|(a, b)| a != b)
            .unwrap_or_else(|| written.len().min(bytes.len()));
        log::error!(
            "Round trip differs at byte {} (read {} bytes, wrote {})",
            first_difference,
            bytes.len(),
            written.len()
        );
        process::exit(1)
    }
}

fn demo(matches: &ArgMatches) -> Result<(), Error> {
    let class_name = matches
        .get_one::<String>("class")
        .map(String::as_str)
        .unwrap_or("Demo");
    let output = matches
        .get_one::<PathBuf>("output")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(format!("{}.class", class_name)));

    let mut class = ClassBuilder::new(
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        class_name,
        "java/lang/Object",
        &[],
    )?;
    let binary_int = MethodDescriptor {
        parameters: vec![FieldType::int(), FieldType::int()],
        return_type: Some(FieldType::int()),
    };
    let unary_int = MethodDescriptor {
        parameters: vec![FieldType::int()],
        return_type: Some(FieldType::int()),
    };

    let mut max = class.method_builder(true, &binary_int)?;
    build_max(&mut max)?;
    let code = max.finish(class.constants_mut())?;
    let flags = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;
    class.add_method(flags, "max", &binary_int.render(), code)?;

    let mut triangle = class.method_builder(true, &unary_int)?;
    build_triangle(&mut triangle, &mut class)?;
    let code = triangle.finish(class.constants_mut())?;
    class.add_method(flags, "triangle", &unary_int.render(), code)?;

    log::info!("Writing '{}'", output.display());
    class.result().save_to_path(&output, true)?;
    Ok(())
}

/// `if (a <= b) return b; else return a;`
fn build_max(method: &mut MethodBuilder) -> Result<(), Error> {
    let entry = method.entry();
    let return_b = method.continue_block(entry, vec![])?;
    let return_a = method.continue_block(entry, vec![])?;

    let block = method.block(entry)?;
    block.load_local(0)?;
    block.load_local(1)?;
    block.branch(BranchCondition::Le, return_b, return_a)?;

    let block = method.block(return_b)?;
    block.load_local(1)?;
    block.return_value()?;

    let block = method.block(return_a)?;
    block.load_local(0)?;
    block.return_value()
}

/// `int acc = 0; for (int i = 1; i <= n; i++) acc += i; return acc;`
fn build_triangle(method: &mut MethodBuilder, class: &mut ClassBuilder) -> Result<(), Error> {
    let pool = class.constants_mut();
    let entry = method.entry();

    let block = method.block(entry)?;
    let acc = block.reserve_local(VerificationType::Integer)?;
    let i = block.reserve_local(VerificationType::Integer)?;
    block.push_int(pool, 0)?;
    block.store_local(acc)?;
    block.push_int(pool, 1)?;
    block.store_local(i)?;

    let header = method.continue_block(entry, vec![])?;
    let body = method.continue_block(entry, vec![])?;
    let exit = method.continue_block(entry, vec![])?;
    method.block(entry)?.jump(header)?;

    let block = method.block(header)?;
    block.load_local(i)?;
    block.load_local(0)?;
    block.branch(BranchCondition::Le, body, exit)?;

    let block = method.block(body)?;
    block.load_local(acc)?;
    block.load_local(i)?;
    block.arithmetic(ArithmeticOp::Add, NumericKind::Int)?;
    block.store_local(acc)?;
    block.load_local(i)?;
    block.push_int(pool, 1)?;
    block.arithmetic(ArithmeticOp::Add, NumericKind::Int)?;
    block.store_local(i)?;
    block.jump(header)?;

    let block = method.block(exit)?;
    block.load_local(acc)?;
    block.return_value()
}
