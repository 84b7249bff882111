use std::sync::Arc;

use time::OffsetDateTime;

use super::super::render;
use super::super::{Ctx, SubmitArgs, drive, load_form, print_json, print_line};
use crate::Result;
use crate::api::HttpApi;
use crate::notify::ChannelSink;
use crate::wizard::SubmitNotices;

pub(crate) fn handle(ctx: &Ctx, args: SubmitArgs) -> Result<()> {
    let form = load_form(&args.file)?;
    let flow = args.flow;
    let id = args.id.as_deref();

    let (sink, toasts) = ChannelSink::unbounded();
    let notices = SubmitNotices {
        success: Some(flow.success_message(id.is_some()).to_string()),
        duration: ctx.config.notifications.duration(),
    };
    let wizard = flow.wizard(form)?.with_notifier(Arc::new(sink), notices);

    let report = drive(flow, &wizard);
    if !report.ready {
        if ctx.json {
            print_json(&report)?;
        } else {
            print_line(&render::render_check(&report))?;
        }
        std::process::exit(1);
    }

    let api = HttpApi::from_config(&ctx.config.api)?;
    let outcome = wizard.submit(|form| flow.send(&api, &form, id, OffsetDateTime::now_utc()));

    if !ctx.json {
        for toast in toasts.try_iter() {
            eprintln!("{}", render::render_notification(&toast));
        }
    }
    let response = outcome?;
    if ctx.json {
        print_json(&response)
    } else {
        print_line(&render::render_response(&response))
    }
}
