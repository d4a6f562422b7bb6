use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use axml::{
    is_protobuf_format, AttributeValue, AxmlDocument, AxmlParser, EventType, ProtobufXmlResource, ResourceIds,
    XmlOptions, ANDROID_NS_URI,
};
use clap::{Parser, Subcommand};
use log::{debug, info};

#[derive(Parser)]
#[command(version, long_about = None)]
#[command(arg_required_else_help = true)]
#[command(about = "Prints, inspects and patches Android binary XML files")]
struct Cli {
    /// Log the details of each step
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Converts a binary XML file (AXML or aapt2 protobuf) to text XML and prints it.
    Print {
        file: PathBuf,
        /// Number of spaces per indentation level. 0 prints the document on one line.
        #[arg(short, long, default_value_t = 4)]
        indent: usize,
    },
    /// Prints each event produced when parsing an AXML file.
    Events { file: PathBuf },
    /// Adds an attribute in the android namespace to the <application> element, and saves the result.
    Inject {
        file: PathBuf,
        /// Name of the attribute, without the `android:` prefix
        #[arg(short, long)]
        name: String,
        /// `true`/`false`, a number, `@` followed by a hex resource ID, or otherwise a string.
        #[arg(long)]
        value: String,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::builder()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .format_target(false)
        .format_timestamp(None)
        .init();

    match cli.command {
        Commands::Print { file, indent } => print_xml(&file, indent)?,
        Commands::Events { file } => print_events(&file)?,
        Commands::Inject {
            file,
            name,
            value,
            output,
        } => inject_attribute(&file, &name, &value, &output)?,
    }

    Ok(())
}

fn print_xml(path: &Path, indent: usize) -> Result<()> {
    let contents = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let resource_ids = ResourceIds::android();
    let options = XmlOptions {
        indent: (indent > 0).then(|| " ".repeat(indent)),
        declaration: true,
        resolver: Some(&resource_ids),
    };

    let xml = if is_protobuf_format(&contents) {
        debug!("Reading {} as protobuf XML", path.display());
        let mut resource = ProtobufXmlResource::new();
        if !resource.read(contents.as_slice()).context("Failed to parse protobuf XML")? {
            return Err(anyhow!("Protobuf XML had no root element"));
        }
        resource.to_xml_with(&options)?
    } else {
        let document = AxmlDocument::read(contents.as_slice()).context("Failed to parse AXML")?;
        if document.string_pool().is_suspicious() {
            info!("The string pool of this file is malformed, string values may be unreliable");
        }
        document.to_xml_with(&options)?
    };

    println!("{xml}");
    Ok(())
}

fn print_events(path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut parser = AxmlParser::open(BufReader::new(file));

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    loop {
        let event = parser
            .advance()
            .with_context(|| {
                format!("Failed to parse the event after {}", parser.position_description())
            })?;
        let indent = "  ".repeat(parser.depth().max(0) as usize);

        match event {
            EventType::StartDocument => writeln!(out, "START_DOCUMENT")?,
            EventType::EndDocument => {
                writeln!(out, "END_DOCUMENT")?;
                break;
            }
            EventType::StartTag => {
                writeln!(
                    out,
                    "{indent}START_TAG {} (line {}, depth {})",
                    qualified(parser.prefix(), parser.name().unwrap_or_default()),
                    parser.line_number().unwrap_or_default(),
                    parser.depth()
                )?;
                for i in 0..parser.attribute_count()? {
                    writeln!(
                        out,
                        "{indent}    {}=\"{}\" (type 0x{:02x})",
                        qualified(parser.attribute_prefix(i)?, parser.attribute_name(i)?),
                        parser.attribute_value(i)?,
                        parser.attribute_value_type(i)?
                    )?;
                }
            }
            EventType::EndTag => writeln!(
                out,
                "{indent}END_TAG {}",
                qualified(parser.prefix(), parser.name().unwrap_or_default())
            )?,
            EventType::Text => writeln!(out, "{indent}TEXT {:?}", parser.text().unwrap_or_default())?,
        }
    }

    parser.close();
    Ok(())
}

fn qualified(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}:{name}")
    }
}

fn inject_attribute(path: &Path, name: &str, value: &str, output: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut document = AxmlDocument::read(BufReader::new(file)).context("Failed to parse AXML")?;

    let resource_id = ResourceIds::android().get_res_id_or_none(name);
    if resource_id.is_none() {
        info!("{name} is not a known framework attribute, it will be added without a resource ID");
    }

    let attribute = document
        .new_attribute(Some(ANDROID_NS_URI), name, resource_id, &parse_value(value))
        .context("Failed to create attribute")?;
    document
        .inject_application_attribute(attribute)
        .context("Failed to add attribute to application")?;

    let out_file =
        File::create(output).with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(out_file);
    document.write(&mut writer).context("Failed to save AXML")?;
    writer.flush()?;

    info!("Added android:{name} to the application element, saved to {}", output.display());
    Ok(())
}

// Interprets a command line value as the attribute type it most likely represents.
fn parse_value(value: &str) -> AttributeValue {
    match value {
        "true" => return AttributeValue::Boolean(true),
        "false" => return AttributeValue::Boolean(false),
        _ => {}
    }

    if let Ok(integer) = value.parse::<i32>() {
        return AttributeValue::Integer(integer);
    }
    // "nan" and "inf" are more likely to be words than numbers
    match value.parse::<f32>() {
        Ok(float) if float.is_finite() => return AttributeValue::Float(float),
        _ => {}
    }

    if let Some(hex) = value.strip_prefix('@') {
        if let Ok(id) = u32::from_str_radix(hex.trim_start_matches("0x"), 16) {
            return AttributeValue::Reference(id);
        }
    }

    AttributeValue::String(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_parsing() {
        assert_eq!(parse_value("true"), AttributeValue::Boolean(true));
        assert_eq!(parse_value("-12"), AttributeValue::Integer(-12));
        assert_eq!(parse_value("1.5"), AttributeValue::Float(1.5));
        assert_eq!(parse_value("@7f010000"), AttributeValue::Reference(0x7f010000));
        assert_eq!(parse_value("@0x7f010000"), AttributeValue::Reference(0x7f010000));
        assert_eq!(
            parse_value("@string/app_name"),
            AttributeValue::String("@string/app_name".to_string())
        );
        assert_eq!(parse_value("hello"), AttributeValue::String("hello".to_string()));
        for word in ["nan", "NaN", "inf", "-infinity"] {
            assert_eq!(parse_value(word), AttributeValue::String(word.to_string()));
        }
    }
}
