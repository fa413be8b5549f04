// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::args::{CloneArgs, DeadlineArgs, OnHedgeArgs, RecoveryArgs};
use crate::RecoveryInfo;
use crate::utils::define_fn_wrapper;

define_fn_wrapper!(CloneInput<In>(Fn(input: &mut In, args: CloneArgs) -> Option<In>));
define_fn_wrapper!(ShouldRecover<Out>(Fn(output: &Out, args: RecoveryArgs<'_>) -> RecoveryInfo));
define_fn_wrapper!(OnHedge<>(Fn(args: OnHedgeArgs) -> ()));
define_fn_wrapper!(DeadlineOutput<Out>(Fn(args: DeadlineArgs) -> Out));
