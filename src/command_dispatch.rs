//! Purpose: Hold top-level CLI command dispatch for `vistascope`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Each command opens the store at most once per handle it needs.
//! Invariants: Helpers in `main.rs` own output formatting; the library owns semantics.

use super::*;

pub(super) fn dispatch_command(command: Command, ctx: &RunContext) -> Result<RunOutcome, Error> {
    match command {
        Command::Explore {
            global,
            subscripts,
            max_nodes,
            raw,
            include_phi,
            list_allowlist,
            allow,
        } => {
            let policy = explore_policy(&allow);
            if list_allowlist {
                let allowed: Vec<&str> = policy.allowlist().collect();
                if ctx.json {
                    emit_json(json!({ "allowlist": allowed }));
                } else {
                    for global in allowed {
                        let tag = if policy.is_sensitive(global) { " (sensitive)" } else { "" };
                        println!("{global}{tag}");
                    }
                }
                return Ok(RunOutcome::ok());
            }
            let Some(global) = global else {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("explore requires --global")
                    .with_hint("Use `vistascope explore --global ^DIC` or `--list-allowlist`."));
            };
            let path = explore_path(&global, &subscripts)?;
            // Refuse before touching the store file at all.
            policy.check(&path)?;
            let options = DisplayOptions {
                raw,
                include_sensitive: include_phi,
            };
            let reader = SafeReader::new(ctx.open_store()?, policy);
            let node = reader.read_node(&path, options)?;
            let listing = reader.list_children(&path, max_nodes, options)?;

            if include_phi && reader.policy().is_sensitive(path.global()) {
                emit_unredacted(ctx, path.global());
            }
            if listing.truncated {
                emit_truncation(ctx, "explore", &listing.path, max_nodes);
            }
            if ctx.json {
                emit_json(json!({ "node": to_json(&node)?, "children": to_json(&listing)? }));
            } else {
                print_node(&node);
                print_listing(&listing);
            }
            Ok(RunOutcome::ok())
        }
        Command::Patient { ien, show, start } => {
            let resolver = PatientResolver::new(ctx.open_store()?);
            if let Some(ien) = ien {
                let patient = resolver.lookup(&ien)?;
                if ctx.json {
                    emit_json(to_json(&patient)?);
                } else {
                    print_patient(&patient);
                }
                return Ok(RunOutcome::ok());
            }
            let page = resolver.scan(&start, show)?;
            if !page.exhausted {
                emit_truncation(ctx, "patient", "^DPT", show);
            }
            if ctx.json {
                emit_json(to_json(&page)?);
            } else {
                print_patient_page(&page);
                if let (false, Some(last)) = (page.exhausted, page.last.as_deref()) {
                    println!("(next page: --start {last})");
                }
            }
            Ok(RunOutcome::ok())
        }
        Command::Staff { ien, show, start } => {
            let resolver = StaffResolver::new(ctx.open_store()?);
            if let Some(ien) = ien {
                let member = resolver.lookup(&ien)?;
                if ctx.json {
                    emit_json(to_json(&member)?);
                } else {
                    print_staff(&member);
                }
                return Ok(RunOutcome::ok());
            }
            let page = resolver.scan(&start, show)?;
            if !page.exhausted {
                emit_truncation(ctx, "staff", "^VA(200)", show);
            }
            if ctx.json {
                emit_json(to_json(&page)?);
            } else {
                for member in &page.items {
                    print_staff(member);
                }
                if let (false, Some(last)) = (page.exhausted, page.last.as_deref()) {
                    println!("(next page: --start {last})");
                }
            }
            Ok(RunOutcome::ok())
        }
        Command::Rpc {
            name,
            prefix,
            limit,
            detail,
        } => {
            let resolver = RpcResolver::new(ctx.open_store()?);
            if let Some(name) = name {
                let def = resolver.find_by_name(&name)?;
                if ctx.json {
                    emit_json(to_json(&def)?);
                } else {
                    print_rpc(&def);
                }
                return Ok(RunOutcome::ok());
            }
            let prefix = prefix.unwrap_or_default();
            let defs = resolver.list_by_prefix(&prefix, limit)?;
            if ctx.json {
                emit_json(json!({ "prefix": prefix, "rpcs": to_json(&defs)? }));
            } else if defs.is_empty() {
                println!("(no remote procedures match {prefix:?})");
            } else {
                for def in &defs {
                    if detail {
                        print_rpc(def);
                        println!();
                    } else {
                        println!("{:<8} {:<40} {}", def.ien, def.name, def.entry_point);
                    }
                }
            }
            Ok(RunOutcome::ok())
        }
        Command::Files { prefix, limit } => {
            let store = ctx.open_store()?;
            let listing = list_files(&store, &prefix, limit)?;
            if listing.truncated {
                emit_truncation(ctx, "files", "^DIC", limit);
            }
            if ctx.json {
                emit_json(to_json(&listing)?);
            } else {
                print_files(&listing);
            }
            Ok(RunOutcome::ok())
        }
        Command::Globals { prefix, limit } => {
            let store = ctx.open_store()?;
            let listing = list_globals(&store, &prefix, limit)?;
            if listing.truncated {
                emit_truncation(ctx, "globals", "^DIC", limit);
            }
            if ctx.json {
                emit_json(to_json(&listing)?);
            } else {
                print_globals(&listing);
            }
            Ok(RunOutcome::ok())
        }
        Command::Aggregate {
            patient_id,
            search,
            site,
            deadline_ms,
            concurrent,
        } => {
            let store = ctx.open_store()?;
            let aggregator = Aggregator::new(aggregate_options(site, deadline_ms, concurrent));
            if let Some(dfn) = patient_id {
                let record = aggregator.aggregate_from(&store, &dfn);
                if ctx.json {
                    emit_json(to_json(&record)?);
                } else {
                    print_record(&record);
                }
                return Ok(finish_record(ctx, &record));
            }
            let term = search.unwrap_or_default();
            let outcome = aggregator.search_and_aggregate(&store, &term)?;
            if ctx.json {
                emit_json(to_json(&outcome)?);
            }
            match &outcome {
                SearchOutcome::NoMatch => {
                    if !ctx.json {
                        println!("No patients found matching {term:?}");
                    }
                    Ok(RunOutcome::ok())
                }
                SearchOutcome::Ambiguous { candidates } => {
                    if !ctx.json {
                        print_candidates(candidates);
                        println!("\nSeveral patients match; rerun with --patient-id <DFN>.");
                    }
                    Ok(RunOutcome::ok())
                }
                SearchOutcome::Single { candidate, record } => {
                    if !ctx.json {
                        print_candidates(std::slice::from_ref(candidate));
                        println!();
                        print_record(record);
                    }
                    Ok(finish_record(ctx, record))
                }
            }
        }
        Command::Date { command } => {
            let (raw, value) = match command {
                // Undecodable input renders as the codec's invalid-date marker.
                DateCommand::Fileman { raw } => {
                    let value = json!({
                        "raw": raw,
                        "valid": piece::decode_fileman_date(&raw).is_ok(),
                        "date": piece::render_fileman_date(&raw),
                        "datetime": piece::render_fileman_datetime(&raw),
                    });
                    (raw, value)
                }
                DateCommand::Horolog { raw } => {
                    let value = json!({
                        "raw": raw,
                        "valid": piece::decode_horolog(&raw).is_ok(),
                        "datetime": piece::render_horolog(&raw),
                    });
                    (raw, value)
                }
            };
            if ctx.json {
                emit_json(value);
            } else {
                let rendered = value["datetime"].as_str().unwrap_or_default();
                println!("{raw} -> {rendered}");
            }
            Ok(RunOutcome::ok())
        }
    }
}
