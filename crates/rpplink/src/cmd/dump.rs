use rpplink_marshal::{decode_all, CodeObject, Value};
use serde_json::{json, Value as Json};

use crate::cmd::DumpArgs;
use crate::exit::{io_error, marshal_error, CliResult, SUCCESS};
use crate::output::{print_json, table, OutputFormat};

pub fn run(args: DumpArgs, format: OutputFormat) -> CliResult<i32> {
    let image = std::fs::read(&args.image)
        .map_err(|err| io_error(&format!("reading {}", args.image.display()), err))?;
    let value = decode_all(&image)
        .map_err(|err| marshal_error(&format!("decoding {}", args.image.display()), err))?;

    match format {
        OutputFormat::Json => print_json(&to_json(&value)),
        OutputFormat::Table => print_table(&value, image.len()),
        OutputFormat::Pretty => {
            let mut out = String::new();
            write_tree(&mut out, &value, 0);
            print!("{out}");
        }
    }
    Ok(SUCCESS)
}

fn to_json(value: &Value) -> Json {
    match value {
        Value::None => Json::Null,
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::Float(x) => json!(x),
        Value::Str(bytes) => json!(String::from_utf8_lossy(bytes)),
        Value::Tuple(items) | Value::List(items) => {
            Json::Array(items.iter().map(to_json).collect())
        }
        Value::Dict(entries) => Json::Array(
            entries
                .iter()
                .map(|(k, v)| json!({ "key": to_json(k), "value": to_json(v) }))
                .collect(),
        ),
        Value::Code(code) => code_json(code),
    }
}

fn code_json(code: &CodeObject) -> Json {
    json!({
        "type": "code",
        "name": String::from_utf8_lossy(&code.name),
        "filename": String::from_utf8_lossy(&code.filename),
        "first_line": code.first_line,
        "arg_count": code.arg_count,
        "flags": code.flags,
        "stack_size": code.stack_size,
        "n_locals": code.n_locals,
        "n_freevars": code.n_freevars,
        "code_size": code.code.len(),
        "names": code.names.iter().map(to_json).collect::<Vec<_>>(),
        "consts": code.consts.iter().map(to_json).collect::<Vec<_>>(),
        "cellvars": code.cellvars.iter().map(to_json).collect::<Vec<_>>(),
    })
}

fn print_table(value: &Value, image_size: usize) {
    let Some(code) = value.as_code() else {
        let mut table = table(&["TYPE", "VALUE"]);
        table.add_row(vec![value.kind().to_string(), value.to_string()]);
        println!("{table}");
        return;
    };

    let mut table = table(&["FIELD", "VALUE"]);
    let rows = [
        ("name", code.name_lossy()),
        ("filename", String::from_utf8_lossy(&code.filename).into_owned()),
        ("image size", format!("{image_size} bytes")),
        ("code size", format!("{} bytes", code.code.len())),
        ("first line", code.first_line.to_string()),
        ("args", code.arg_count.to_string()),
        ("locals", code.n_locals.to_string()),
        ("stack size", code.stack_size.to_string()),
        ("flags", format!("{:#04x}", code.flags)),
        ("names", join(&code.names)),
        ("consts", join(&code.consts)),
    ];
    for (name, value) in rows {
        table.add_row(vec![name.to_string(), value]);
    }
    println!("{table}");
}

fn join(values: &[Value]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_tree(out: &mut String, value: &Value, depth: usize) {
    let indent = "  ".repeat(depth);
    match value {
        Value::Code(code) => {
            out.push_str(&format!("{indent}{value}\n"));
            out.push_str(&format!(
                "{indent}  args={} locals={} stack={} flags={:#04x} code={} bytes\n",
                code.arg_count,
                code.n_locals,
                code.stack_size,
                code.flags,
                code.code.len()
            ));
            out.push_str(&format!("{indent}  names: {}\n", join(&code.names)));
            out.push_str(&format!("{indent}  consts:\n"));
            for item in &code.consts {
                write_tree(out, item, depth + 2);
            }
        }
        other => out.push_str(&format!("{indent}{other}\n")),
    }
}
