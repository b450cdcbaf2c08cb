/// Generic formatting code for a table of report rows, presented columnar, as csv, or as json, and
/// (except for json) with or without a header and with or without named fields.
///
/// Each report defines a set of named formatters that extract one field from a row as a string.
/// The --fmt option selects fields (or aliases for groups of fields) and controls, in any order.

use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::io;

pub struct Help {
    pub fields: Vec<String>,
    pub aliases: Vec<(String, Vec<String>)>,
    pub defaults: String,
}

/// If `fmt` asks for help, print it and return true.

pub fn maybe_help<F>(fmt: &Option<String>, f: F) -> bool
where
    F: Fn() -> Help,
{
    let Some(ref s) = fmt else { return false };
    if !s.starts_with("help") {
        return false;
    }
    let mut help = f();
    println!("Syntax:\n  --fmt=(field|alias|control),...");
    println!("\nFields:");
    help.fields.sort();
    for f in help.fields {
        println!("  {f}");
    }
    if !help.aliases.is_empty() {
        println!("\nAliases:");
        help.aliases.sort();
        for (name, fields) in help.aliases {
            println!("  {name} --> {}", fields.join(","));
        }
    }
    println!("\nDefaults:\n  {}", help.defaults);
    println!("\nControl:\n  csv\n  csvnamed\n  fixed\n  json\n  header\n  noheader");
    true
}

/// Return a vector of the known fields in `spec` wrt the formatters, and a HashSet of any other
/// strings found in `spec`.  It returns an error if zero output fields were selected.

pub fn parse_fields<'a, V>(
    spec: &'a str,
    formatters: &HashMap<String, V>,
    aliases: &'a HashMap<String, Vec<String>>,
) -> Result<(Vec<&'a str>, HashSet<&'a str>)> {
    let mut others = HashSet::new();
    let mut fields = vec![];
    for x in spec.split(',') {
        if formatters.contains_key(x) {
            fields.push(x);
        } else if let Some(expansion) = aliases.get(x) {
            for name in expansion {
                if formatters.contains_key(name) {
                    fields.push(name.as_str());
                } else {
                    others.insert(name.as_str());
                }
            }
        } else {
            others.insert(x);
        }
    }
    if fields.is_empty() {
        bail!("No output fields were selected")
    }
    Ok((fields, others))
}

#[derive(Debug, Default)]
pub struct FormatOptions {
    pub json: bool,   // json explicitly requested
    pub csv: bool,    // csv or csvnamed explicitly requested
    pub fixed: bool,  // fixed output explicitly requested
    pub named: bool,  // csvnamed explicitly requested
    pub header: bool, // true if nothing requested b/c fixed+header is default
}

pub fn standard_options(others: &HashSet<&str>) -> FormatOptions {
    let named = others.contains("csvnamed");
    let csv = others.contains("csv") || named;
    let json = others.contains("json") && !csv;
    let fixed = others.contains("fixed") && !csv && !json;
    // json gets no header, even if one is requested
    let header = (!csv && !json && !others.contains("noheader"))
        || (csv && others.contains("header"));
    FormatOptions {
        json,
        csv,
        fixed,
        named,
        header,
    }
}

/// The `fields` are the names of formatting functions to get from the `formatters`, these are
/// applied to the `data`.  Set `opts.header` to true to print a first row with field names as a
/// header (independent of csv).  Set `opts.csv` to true to get CSV output instead of fixed-format,
/// or `opts.json` to get an array of objects.

pub fn format_data<DataT, FmtT, CtxT>(
    output: &mut dyn io::Write,
    fields: &[&str],
    formatters: &HashMap<String, FmtT>,
    opts: &FormatOptions,
    data: Vec<DataT>,
    ctx: CtxT,
) -> Result<()>
where
    FmtT: Fn(&DataT, CtxT) -> String,
    CtxT: Copy,
{
    let mut fns = Vec::with_capacity(fields.len());
    for kwd in fields {
        match formatters.get(*kwd) {
            Some(f) => fns.push(f),
            None => bail!("Unknown field {kwd}"),
        }
    }

    let rows = data
        .iter()
        .map(|x| fns.iter().map(|f| f(x, ctx)).collect::<Vec<String>>())
        .collect::<Vec<Vec<String>>>();

    if opts.csv {
        format_csv(output, fields, opts, &rows)
    } else if opts.json {
        format_json(output, fields, &rows)
    } else {
        format_fixed_width(output, fields, opts, &rows)
    }
}

fn format_fixed_width(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    rows: &[Vec<String>],
) -> Result<()> {
    // The column width is the max across all the entries in the column (including header,
    // if present).
    let mut widths = if opts.header {
        fields.iter().map(|kwd| kwd.len()).collect::<Vec<usize>>()
    } else {
        vec![0; fields.len()]
    };
    for row in rows {
        for (w, val) in widths.iter_mut().zip(row) {
            *w = usize::max(*w, val.len());
        }
    }

    if opts.header {
        write_padded(output, &widths, fields.iter().copied())?;
    }
    for row in rows {
        write_padded(output, &widths, row.iter().map(|s| s.as_str()))?;
    }
    Ok(())
}

fn write_padded<'a>(
    output: &mut dyn io::Write,
    widths: &[usize],
    vals: impl Iterator<Item = &'a str>,
) -> Result<()> {
    let mut s = "".to_string();
    for (val, w) in vals.zip(widths) {
        s += format!("{:w$}  ", val, w = *w).as_str();
    }
    output.write_all(s.trim_end().as_bytes())?;
    output.write_all(b"\n")?;
    Ok(())
}

fn format_csv(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    rows: &[Vec<String>],
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(output);

    if opts.header {
        writer.write_record(fields)?;
    }
    for row in rows {
        if opts.named {
            writer.write_record(
                fields
                    .iter()
                    .zip(row)
                    .map(|(kwd, val)| format!("{kwd}={val}")),
            )?;
        } else {
            writer.write_record(row)?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn format_json(output: &mut dyn io::Write, fields: &[&str], rows: &[Vec<String>]) -> Result<()> {
    let objects = rows
        .iter()
        .map(|row| {
            let mut obj = json::JsonValue::new_object();
            for (kwd, val) in fields.iter().zip(row) {
                obj[*kwd] = val.clone().into();
            }
            obj
        })
        .collect::<Vec<json::JsonValue>>();
    output.write_all(json::stringify(objects).as_bytes())?;
    output.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
type TestDatum<'a> = &'a (i32, &'static str);
#[cfg(test)]
type TestCtx<'a> = &'a i32;

#[cfg(test)]
fn test_formatters() -> (
    HashMap<String, &'static dyn Fn(TestDatum, TestCtx) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(TestDatum, TestCtx) -> String> =
        HashMap::new();
    formatters.insert("n".to_string(), &test_format_n);
    formatters.insert("name".to_string(), &test_format_name);
    let mut aliases = HashMap::new();
    aliases.insert("all".to_string(), vec!["name".to_string(), "n".to_string()]);
    (formatters, aliases)
}

#[cfg(test)]
fn test_format_n(d: TestDatum, c: TestCtx) -> String {
    (d.0 * c).to_string()
}

#[cfg(test)]
fn test_format_name(d: TestDatum, _: TestCtx) -> String {
    d.1.to_string()
}

#[cfg(test)]
fn format_to_string(spec: &str) -> String {
    let (formatters, aliases) = test_formatters();
    let (fields, others) = parse_fields(spec, &formatters, &aliases).unwrap();
    let opts = standard_options(&others);
    let mut out = Vec::<u8>::new();
    let data = vec![(1, "alpha"), (20, "b")];
    format_data(&mut out, &fields, &formatters, &opts, data, &10).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_format_fixed() {
    assert!(format_to_string("name,n") == "name   n\nalpha  10\nb      200\n");
    assert!(format_to_string("all,noheader") == "alpha  10\nb      200\n");
}

#[test]
fn test_format_csv() {
    assert!(format_to_string("n,name,csv") == "10,alpha\n200,b\n");
    assert!(format_to_string("n,csv,header") == "n\n10\n200\n");
    assert!(format_to_string("n,name,csvnamed") == "n=10,name=alpha\nn=200,name=b\n");
}

#[test]
fn test_format_json() {
    assert!(format_to_string("n,name,json") == "[{\"n\":\"10\",\"name\":\"alpha\"},{\"n\":\"200\",\"name\":\"b\"}]\n");
}

#[test]
fn test_parse_fields() {
    let (formatters, aliases) = test_formatters();
    let (fields, others) = parse_fields("all,csv,bogus", &formatters, &aliases).unwrap();
    assert!(fields == vec!["name", "n"]);
    assert!(others.contains("csv") && others.contains("bogus"));
    assert!(parse_fields("csv", &formatters, &aliases).is_err());
}
