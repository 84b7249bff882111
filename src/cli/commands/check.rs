use super::super::render;
use super::super::{CheckArgs, Ctx, drive, load_form, print_json, print_line};
use crate::Result;

pub(crate) fn handle(ctx: &Ctx, args: CheckArgs) -> Result<()> {
    let form = load_form(&args.file)?;
    let wizard = args.flow.wizard(form)?;
    let report = drive(args.flow, &wizard);

    if ctx.json {
        print_json(&report)?;
    } else {
        print_line(&render::render_check(&report))?;
    }
    if !report.ready {
        std::process::exit(1);
    }
    Ok(())
}
